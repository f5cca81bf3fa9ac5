use super::real;
use crate::model::FuelSat;
use kestrel::*;

/// Warms the transmitter, then sends `megabytes` to the ground at `rate` MB/s.
pub struct Downlink {
    pub sat: FuelSat,
    pub megabytes: f64,
    pub rate: f64,
}

impl Downlink {
    pub fn from_args(sat: FuelSat, args: &Value) -> Result<Self> {
        let megabytes = real(args, "megabytes")?;
        if !(megabytes.is_finite() && megabytes >= 0.0) {
            bail!("downlink volume must be non-negative, got {megabytes} MB");
        }
        let rate = real(args, "rate")?;
        if !(rate.is_finite() && rate > 0.0) {
            bail!("downlink rate must be positive, got {rate} MB/s");
        }
        Ok(Self {
            sat,
            megabytes,
            rate,
        })
    }
}

impl Activity for Downlink {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        let sat = self.sat;
        ctx.call(
            activity(move |ctx| {
                ctx.emit(sat.heater, Some(true));
                ctx.defer(2.minutes())?;
                Ok(())
            })
            .named("warm up"),
        )?;

        ctx.emit(sat.mode, Some("downlink".to_string()));
        ctx.defer(Duration::from_seconds(self.megabytes / self.rate))?;
        ctx.emit(sat.downlinked, self.megabytes);
        ctx.emit(sat.heater, Some(false));
        ctx.emit(sat.mode, Some("cruise".to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "downlink"
    }
}
