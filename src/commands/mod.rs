pub mod advise;
pub mod check;
pub mod scan;
pub mod show;
pub mod test_alert;
