use serde_json::{json, Value as JsonValue};

use super::round_to;
use crate::decoder::EnumValue;
use crate::snapshot::DeviceSnapshot;

/// Pretty-printed JSON document
pub fn to_json(snapshot: &DeviceSnapshot) -> String {
    format!("{:#}", to_json_value(snapshot))
}

fn state(value: &Option<EnumValue>) -> JsonValue {
    json!({
        "code": value.as_ref().map(|v| v.code),
        "name": value.as_ref().map(|v| v.label.as_str()),
    })
}

/// JSON object consumed by dashboards; key names and nesting are stable
pub fn to_json_value(snapshot: &DeviceSnapshot) -> JsonValue {
    let identity = &snapshot.identity;
    let states = &snapshot.states;
    let electrical = &snapshot.electrical;
    let session = &snapshot.session;
    let limits = &snapshot.limits;

    json!({
        "identity": {
            "serial": identity.serial,
            "max_power_w": identity.max_power_w,
            "max_power_kw": identity.max_power_w.map(|w| round_to(f64::from(w) / 1000.0, 2)),
            "phases": identity.phases.as_ref().map(|p| p.label.as_str()),
            "phases_raw": identity.phases.as_ref().map(|p| p.code),
        },
        "states": {
            "chargepoint": state(&states.chargepoint),
            "charging": state(&states.charging),
            "equipment": state(&states.equipment),
            "cable": state(&states.cable),
            "fault_code": states.fault_code,
        },
        "electrical": {
            "current": {
                "l1_a": electrical.current_a.l1.map(|a| round_to(a, 2)),
                "l2_a": electrical.current_a.l2.map(|a| round_to(a, 2)),
                "l3_a": electrical.current_a.l3.map(|a| round_to(a, 2)),
            },
            "voltage": {
                "l1_v": electrical.voltage_v.l1,
                "l2_v": electrical.voltage_v.l2,
                "l3_v": electrical.voltage_v.l3,
            },
            "power": {
                "l1_w": electrical.power_w.l1,
                "l2_w": electrical.power_w.l2,
                "l3_w": electrical.power_w.l3,
                "total_w": electrical.total_power_w,
                "total_kw": electrical.total_power_w.map(|w| round_to(f64::from(w) / 1000.0, 2)),
            },
            "meter_reading_kwh": electrical.meter_reading_kwh.map(|kwh| round_to(kwh, 1)),
        },
        "limits": {
            "evse_min_a": limits.evse_min_a,
            "evse_max_a": limits.evse_max_a,
            "cable_max_a": limits.cable_max_a,
            "session_max_a": session.max_current_a,
        },
        "session": {
            "energy_wh": session.energy_wh,
            "energy_kwh": session.energy_wh.map(|wh| round_to(f64::from(wh) / 1000.0, 3)),
            "duration_s": session.duration_s,
        },
        "settings": {
            "dynamic_current_a": limits.dynamic_current_a,
            "failsafe_current_a": limits.failsafe_current_a,
            "failsafe_timeout_s": limits.failsafe_timeout_s,
        },
    })
}
