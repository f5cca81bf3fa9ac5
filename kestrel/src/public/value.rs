//! The closed value representation used at the kernel's edges.
//!
//! Activities arguments, resource profiles, and simulation results cross the boundary to
//! plan storage and constraint checking as [Value]s. Nothing inside the simulation loop uses
//! this representation.

use crate::public::resource::dynamics::Dynamics;
use duplicate::duplicate_item;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Real(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a field of a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }
}

/// Conversion into the boundary [Value] representation.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

#[duplicate_item(ty; [f64]; [f32])]
impl ToValue for ty {
    fn to_value(&self) -> Value {
        Value::Real(*self as f64)
    }
}

#[duplicate_item(ty; [i8]; [i16]; [i32]; [i64]; [u8]; [u16]; [u32])]
impl ToValue for ty {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for Duration {
    fn to_value(&self) -> Value {
        Value::Real(self.to_seconds())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => Value::List(vec![v.to_value()]),
            None => Value::List(vec![]),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: ToValue> ToValue for Dynamics<T> {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        match self {
            Dynamics::Constant(v) => {
                map.insert("type".to_string(), Value::Text("constant".to_string()));
                map.insert("value".to_string(), v.to_value());
            }
            Dynamics::Linear { value, rate } => {
                map.insert("type".to_string(), Value::Text("linear".to_string()));
                map.insert("value".to_string(), value.to_value());
                map.insert("rate".to_string(), rate.to_value());
            }
            Dynamics::Failed(failure) => {
                map.insert("type".to_string(), Value::Text("failed".to_string()));
                map.insert("failure".to_string(), Value::Text(failure.to_string()));
            }
        }
        Value::Map(map)
    }
}

impl<T: ToValue> Dynamics<T> {
    /// The same dynamics with its values converted to the boundary representation.
    pub fn to_values(&self) -> Dynamics<Value> {
        match self {
            Dynamics::Constant(v) => Dynamics::Constant(v.to_value()),
            Dynamics::Linear { value, rate } => Dynamics::Linear {
                value: value.to_value(),
                rate: rate.to_value(),
            },
            Dynamics::Failed(failure) => Dynamics::Failed(failure.clone()),
        }
    }
}
