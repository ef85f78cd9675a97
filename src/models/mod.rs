mod release;
mod schedule;

pub use release::{NormalizedRecord, ReleaseRecord};
pub use schedule::{ScheduleRow, DEFAULT_STATUS};
