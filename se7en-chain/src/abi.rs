//! Contract ABIs
//!
//! One interface per contract module. Argument names only matter for the
//! generated Rust field names; selectors depend on types alone.

alloy::sol! {
    interface IAttestor {
        struct Attestation {
            bytes32 subjectId;
            bytes32 payloadHash;
            bytes32 clause;
            uint256 timestamp;
            address attestor;
        }

        event Attested(
            bytes32 indexed attestationId,
            bytes32 indexed subjectId,
            bytes32 payloadHash,
            string jurisdiction,
            string clause,
            uint256 timestamp,
            address indexed attestor
        );

        function recordAttestation(bytes32 subjectId, bytes32 payloadHash, bytes32 clause)
            external
            returns (bytes32 attestationId);
        function get(bytes32 attestationId) external view returns (Attestation memory attestation);
    }

    interface IAffidavitRegistry {
        struct Affidavit {
            bytes32 assetId;
            bytes32 documentHash;
            address witness;
            uint256 timestamp;
            bytes metadata;
        }

        event AffidavitCreated(
            bytes32 indexed affidavitId,
            bytes32 indexed assetId,
            bytes32 documentHash,
            address indexed witness,
            uint256 timestamp
        );

        function createAffidavit(bytes32 assetId, bytes meta) external returns (bytes32 affidavitId);
        function latestAffidavit(bytes32 assetId) external view returns (bytes32 affidavitId);
        function getAffidavit(bytes32 affidavitId) external view returns (Affidavit memory affidavit);
    }

    interface ICustodyVault {
        event CustodyUpdated(bytes32 indexed assetId, bool custody, uint256 timestamp, address indexed actor);
        event DocumentStored(bytes32 indexed assetId, bytes32 indexed docHash, address indexed actor);

        function setCustody(bytes32 assetId, bool custody) external;
        function setDoc(bytes32 assetId, bytes32 docHash) external;
        function hasCustody(bytes32 assetId) external view returns (bool held);
        function getDocHashes(bytes32 assetId) external view returns (bytes32[] memory hashes);
    }

    interface IIssuanceEngine {
        struct Note {
            bytes32 assetId;
            uint8 instrumentType;
            uint256 par;
            uint256 nav;
            bytes32 affidavitId;
            bytes32 attestationId;
            bool active;
        }

        event AssetNavSet(bytes32 indexed assetId, uint256 nav, address indexed actor);
        event InstrumentIssued(
            uint256 indexed noteId,
            bytes32 indexed assetId,
            uint8 instrumentType,
            uint256 par,
            uint256 nav,
            bytes32 affidavitId
        );
        event InstrumentRedeemed(uint256 indexed noteId, uint256 amount, uint256 remainingNav);
        event NoteNavUpdated(uint256 indexed noteId, uint256 nav);

        function setAssetNAV(bytes32 assetId, uint256 navWei) external;
        function issueCSDN(bytes32 assetId, uint256 par) external returns (uint256 noteId);
        function issueSDN(bytes32 assetId, uint256 par) external returns (uint256 noteId);
        function getNote(uint256 noteId) external view returns (Note memory note);
        function getAggregateNAV() external view returns (uint256 navCsdn, uint256 navSdn);
        function settleRedemption(uint256 noteId, uint256 amount) external;
        function updateNoteAttestation(uint256 noteId, bytes32 attestationId) external;
    }

    interface IInsuranceBinder {
        event BandsDisclosureAnchored(bytes32 indexed disclosureHash, uint256 timestamp);
        event CoverageBound(
            bytes32 indexed binderId,
            bytes32 indexed assetId,
            uint8 classCode,
            uint256 factorBps,
            address indexed underwriter
        );

        function bindCoverage(bytes32 assetId, uint16 classCode, uint256 factorBps, bytes32 disclosureHash)
            external
            returns (bytes32 binderId);
        function getPolicyFloorBps() external pure returns (uint256 floorBps);
    }

    interface ICycleEngine {
        event CycleExecuted(
            bytes32 indexed cycleId,
            uint256 indexed noteId,
            uint16 tenorDays,
            uint16 rateBps,
            address operator,
            uint256 timestamp
        );
        event CycleRun(bytes32 indexed cycleId, uint256 indexed noteId);

        function runCycle(uint256 noteId, uint16 tenorDays, uint16 rateBps) external returns (bytes32 cycleId);
    }

    interface IPolicyRegistry {
        function ok(bytes32 assetId, bytes32 action) external view returns (bool allowed);
    }

    interface ITokenMint {
        event MintByNAV(address indexed to, uint256 amount, uint256 navCsdn, uint256 navSdn, uint256 floorBps);

        function mintByNAV(uint256 navCsdn, uint256 navSdn, uint256 floorBps, address to)
            external
            returns (uint256 amount);
        function burnFrom(address from, uint256 amount) external;
        function policyFloorBps() external view returns (uint256 floorBps);
    }
}
