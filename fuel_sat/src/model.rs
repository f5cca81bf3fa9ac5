use kestrel::resource::discrete::assert_that;
use kestrel::resource::real::greater_or_equal;
use kestrel::*;

/// Kilograms of propellant that must stay in the tank at all times.
pub const RESERVE: f64 = 5.0;

/// The cells of a small spacecraft.
#[derive(Copy, Clone, Debug)]
pub struct FuelSat {
    pub fuel: CellId<LinearIntegrator>,
    pub mode: CellId<Register<String>>,
    pub heater: CellId<Toggle>,
    pub downlinked: CellId<Accumulator>,
}

impl FuelSat {
    pub fn new(branch: &mut Branch, fuel: f64) -> Self {
        Self {
            fuel: branch.allocate(LinearIntegrator::new(fuel, 0.0)),
            mode: branch.allocate(Register::new("cruise".to_string())),
            heater: branch.allocate(Toggle::new(false)),
            downlinked: branch.allocate(Accumulator::new(0.0)),
        }
    }

    /// Registers the resources the mission report is built from.
    pub fn register(&self, branch: &mut Branch) {
        let fuel = from_cell(self.fuel);
        let reserve = assert_that(
            format!("fuel stays above {RESERVE} kg"),
            &greater_or_equal(&fuel, RESERVE),
        );
        branch.register("fuel", &fuel);
        branch.register("fuel reserve", &reserve);
        branch.register("mode", &from_cell(self.mode));
        branch.register("downlinked", &from_cell(self.downlinked));
    }
}
