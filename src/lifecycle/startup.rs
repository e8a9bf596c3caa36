//! Startup ordering and option bookkeeping.
//!
//! # Responsibilities
//! - Order the facility table by priority
//! - Record the order facilities were launched in, for reverse teardown
//! - Inject owner bookkeeping into each facility's options
//!
//! # Design Decisions
//! - Stable sort: equal priorities keep declaration order
//! - Teardown walks the launch record backwards, so stop order is always the
//!   exact reverse of start order

use std::path::Path;

use serde_json::{Map, Value};

use crate::facility::{FacilityDescriptor, FacilityError, FacilityKey};

/// A facility that reached registration, in launch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFacility {
    pub key: FacilityKey,
    pub name: String,
    pub label: String,
    pub priority: i32,
}

impl PlannedFacility {
    pub fn of(descriptor: &FacilityDescriptor) -> Self {
        Self {
            key: FacilityKey::new(&descriptor.name, &descriptor.label),
            name: descriptor.name.clone(),
            label: descriptor.label.clone(),
            priority: descriptor.priority,
        }
    }
}

/// Sort ascending by priority, keeping declaration order on ties.
pub fn order_by_priority(table: &mut [FacilityDescriptor]) {
    table.sort_by_key(|d| d.priority);
}

/// Add `ns`, `label`, `root` and `dirConf` to a facility's options.
///
/// `ns` and `dirConf` are only filled in when the options leave them unset;
/// `label` and `root` always reflect the owner.
pub fn inject_bookkeeping(
    options: Value,
    namespace: &str,
    label: &str,
    root: &Path,
) -> Result<Value, FacilityError> {
    let mut map = match options {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(FacilityError::failed(format!(
                "options must be an object, got {other}"
            )))
        }
    };

    map.entry("ns").or_insert_with(|| Value::from(namespace));
    map.insert("label".into(), Value::from(label));
    map.insert("root".into(), Value::from(root.display().to_string()));
    map.entry("dirConf")
        .or_insert_with(|| Value::from(root.join("config").join("facs").display().to_string()));

    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sort_is_stable() {
        let mut table = vec![
            FacilityDescriptor::new("fac", "api", "0").priority(5),
            FacilityDescriptor::new("fac", "db", "a"),
            FacilityDescriptor::new("fac", "timer", "0").priority(-10),
            FacilityDescriptor::new("fac", "db", "b"),
        ];
        order_by_priority(&mut table);

        let order: Vec<_> = table.iter().map(|d| format!("{}:{}", d.name, d.label)).collect();
        assert_eq!(order, vec!["timer:0", "db:a", "db:b", "api:0"]);
    }

    #[test]
    fn bookkeeping_injected() {
        let opts = inject_bookkeeping(json!({"port": 1}), "ns0", "main", Path::new("/srv/w")).unwrap();
        assert_eq!(
            opts,
            json!({
                "port": 1,
                "ns": "ns0",
                "label": "main",
                "root": "/srv/w",
                "dirConf": "/srv/w/config/facs",
            })
        );
    }

    #[test]
    fn caller_namespace_wins_but_label_does_not() {
        let opts = inject_bookkeeping(json!({"ns": "custom", "label": "x"}), "ns0", "main", Path::new("/r")).unwrap();
        assert_eq!(opts["ns"], "custom");
        assert_eq!(opts["label"], "main");
    }

    #[test]
    fn non_object_options_rejected() {
        assert!(inject_bookkeeping(json!([1]), "ns", "l", Path::new("/r")).is_err());
        assert!(inject_bookkeeping(Value::Null, "ns", "l", Path::new("/r")).is_ok());
    }
}
