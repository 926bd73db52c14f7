pub mod attendance;

pub use attendance::{AttendanceService, CloseOutcome, OpenedSession, ScanOutcome};
