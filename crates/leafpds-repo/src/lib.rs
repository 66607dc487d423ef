pub mod blob;
pub mod blob_refs;
pub mod blockstore_adapter;
pub mod car;
pub mod car_codec;
pub mod operations;

// Re-export key types for external consumers
pub use blob::{ALLOWED_MIME_TYPES, download_blob, sweep_orphans, sync_blob_refs, upload_blob};
pub use blob_refs::{ExtractedBlobRef, diff_blob_refs, extract_blob_refs};
pub use blockstore_adapter::{RepoStoreAdapter, cid_from_bytes, cid_to_bytes};
pub use car::{export_blob_car, export_full_car, generate_diff_car, import_blob_car, import_car};
pub use car_codec::{CarReader, CarWriter};
pub use operations::{
    RecordOutput, RecordWriteOutput, WriteOp, apply_writes, create_record, create_repo,
    delete_record, get_record, list_records, put_record, update_record,
};
