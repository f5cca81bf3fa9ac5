use super::real;
use crate::model::FuelSat;
use kestrel::*;

/// Fires the main engine, drawing `rate` kg/s for `duration`.
pub struct ThrusterBurn {
    pub sat: FuelSat,
    pub rate: f64,
    pub duration: Duration,
}

impl ThrusterBurn {
    pub fn from_args(sat: FuelSat, args: &Value) -> Result<Self> {
        let rate = real(args, "rate")?;
        if !(rate.is_finite() && rate > 0.0) {
            bail!("burn rate must be positive, got {rate}");
        }
        let seconds = real(args, "seconds")?;
        if !(seconds.is_finite() && seconds >= 0.0) {
            bail!("burn length must be a non-negative number of seconds, got {seconds}");
        }
        Ok(Self {
            sat,
            rate,
            duration: Duration::from_seconds(seconds),
        })
    }
}

impl Activity for ThrusterBurn {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        let fuel = from_cell(self.sat.fuel);
        let needed = self.rate * self.duration.to_seconds();
        let available = ctx.get(&fuel)?;
        if needed > available {
            return ctx.fail(format!(
                "burn needs {needed} kg but only {available} kg is left"
            ));
        }

        ctx.emit(self.sat.mode, Some("burn".to_string()));
        ctx.emit(self.sat.fuel, -self.rate);
        ctx.defer(self.duration)?;
        ctx.emit(self.sat.fuel, self.rate);
        ctx.emit(self.sat.mode, Some("cruise".to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "burn"
    }
}
