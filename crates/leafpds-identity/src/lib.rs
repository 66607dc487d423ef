pub mod directory;
pub mod handle;
pub mod registrar;

pub use directory::{fetch_plc_data, last_operation_cid, resolve_did};
pub use handle::{
    allocate_unique_handle, generate_handle_candidate, resolve_handle, validate_handle,
};
pub use registrar::{PlcDocumentState, document_state_from_plc_data};
