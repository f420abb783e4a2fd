pub mod args;
#[cfg(windows)]
pub mod dispatch;
pub mod variant;
