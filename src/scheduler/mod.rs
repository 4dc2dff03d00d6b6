pub mod dispatch;
pub mod ids;
pub mod persistence;
pub mod transfer;
pub mod url_copy;
