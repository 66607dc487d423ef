pub mod assertions;
pub mod server;
pub mod stores;

pub use assertions::{assert_xrpc_error, assert_xrpc_ok};
pub use server::{
    TEST_ACCESS_SECRET, TEST_KEY_ENCRYPTION_SECRET, TEST_REFRESH_SECRET,
    create_account_via_api, create_test_app_state, create_test_router,
    create_test_router_and_stores, send_request,
};
pub use stores::{TestStores, create_test_stores};
