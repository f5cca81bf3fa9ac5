pub mod burn;
pub mod downlink;

use crate::model::FuelSat;
use kestrel::{Catalog, Value};

/// Every activity type a plan file may name.
pub fn catalog(sat: FuelSat) -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .register("burn", move |args: &Value| burn::ThrusterBurn::from_args(sat, args))
        .register("downlink", move |args: &Value| {
            downlink::Downlink::from_args(sat, args)
        });
    catalog
}

fn real(args: &Value, key: &str) -> kestrel::Result<f64> {
    args.get(key)
        .and_then(Value::as_real)
        .ok_or_else(|| kestrel::anyhow!("missing real argument {key:?} in {args:?}"))
}
