pub mod did;
pub mod dpop;
pub mod jwt;
pub mod key_manager;
pub mod oauth_jwt;
pub mod signing;
pub mod tid;

pub use did::{
    create_did_plc_operation, create_did_plc_tombstone_operation, create_did_plc_update_operation,
    plc_operation_cid, verify_with_did_key,
};
pub use dpop::{VerifiedDpopProof, jwk_thumbprint, verify_dpop_proof};
pub use jwt::{
    SessionClaims, SessionScope, create_access_token, create_refresh_token,
    decode_refresh_token_ignoring_expiry, validate_session_token,
};
pub use key_manager::{decrypt_key, encrypt_key, hash_token, random_token};
pub use oauth_jwt::{create_oauth_access_token, public_jwk, validate_oauth_access_token};
pub use signing::SigningKey;
pub use tid::TidGenerator;
