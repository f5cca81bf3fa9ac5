use hifitime::TimeScale::TAI;
use hifitime::{Duration, Epoch as Time};

// Instants are kept as durations since the TAI reference epoch. Comparing two Epochs
// converts both of them between time scales, which is far too slow for the scheduler's
// queues, and TAI is the scale hifitime converts through anyway.

pub fn epoch_to_duration(time: Time) -> Duration {
    time.to_tai_duration()
}

pub const fn duration_to_epoch(duration: Duration) -> Time {
    Time {
        duration,
        time_scale: TAI,
    }
}
