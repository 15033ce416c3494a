use crate::services::{account_service::AccountService, record_service::RecordService};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub records: RecordService,
    pub accounts: AccountService,
    pub pagination: Pagination,
}

#[derive(Clone, Copy, Debug)]
pub struct Pagination {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}
