use ::prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::decoder::EnumValue;
use crate::snapshot::{DeviceSnapshot, PhaseValues};

/// Prometheus text exposition format
///
/// Every series carries the device serial (`""` when unknown). Families
/// without a single present sample are left out.
pub fn to_prometheus(snapshot: &DeviceSnapshot) -> String {
    match encode(snapshot) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            String::new()
        },
    }
}

/// Registry built for one snapshot; dropped after encoding
struct Families<'a> {
    registry: Registry,
    serial: &'a str,
}

impl Families<'_> {
    fn gauge<T: Into<f64>>(
        &self,
        name: &str,
        help: &str,
        value: Option<T>,
    ) -> ::prometheus::Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let gauge = GaugeVec::new(Opts::new(name, help), &["serial"])?;
        gauge.with_label_values(&[self.serial]).set(value.into());
        self.registry.register(Box::new(gauge))
    }

    fn per_phase<T: Into<f64>>(
        &self,
        name: &str,
        help: &str,
        values: &PhaseValues<T>,
    ) -> ::prometheus::Result<()>
    where
        T: Copy,
    {
        if values.iter().all(|(_, value)| value.is_none()) {
            return Ok(());
        }
        let gauge = GaugeVec::new(Opts::new(name, help), &["serial", "phase"])?;
        for (phase, value) in values.iter() {
            if let Some(value) = value {
                let phase = phase.to_string();
                gauge
                    .with_label_values(&[self.serial, phase.as_str()])
                    .set(value.into());
            }
        }
        self.registry.register(Box::new(gauge))
    }
}

fn code(state: &Option<EnumValue>) -> Option<u32> {
    state.as_ref().map(|s| s.code)
}

fn encode(s: &DeviceSnapshot) -> ::prometheus::Result<String> {
    let out = Families {
        registry: Registry::new(),
        serial: s.identity.serial.as_deref().unwrap_or_default(),
    };

    out.gauge("vestel_max_power_watts", "Maximum power in watts", s.identity.max_power_w)?;
    out.gauge(
        "vestel_phases",
        "Phase configuration (0=1-phase, 1=3-phase)",
        code(&s.identity.phases),
    )?;

    out.gauge("vestel_chargepoint_state", "Chargepoint state", code(&s.states.chargepoint))?;
    out.gauge("vestel_charging_state", "Charging state", code(&s.states.charging))?;
    out.gauge("vestel_equipment_state", "Equipment state", code(&s.states.equipment))?;
    out.gauge("vestel_cable_state", "Cable state", code(&s.states.cable))?;
    out.gauge("vestel_fault_code", "EVSE fault code", s.states.fault_code)?;

    let electrical = &s.electrical;
    out.per_phase(
        "vestel_current_amperes",
        "Current in amperes per phase",
        &electrical.current_a,
    )?;
    out.per_phase(
        "vestel_voltage_volts",
        "Voltage in volts per phase",
        &electrical.voltage_v,
    )?;
    out.per_phase("vestel_power_watts", "Power in watts per phase", &electrical.power_w)?;
    out.gauge(
        "vestel_total_power_watts",
        "Total active power in watts",
        electrical.total_power_w,
    )?;
    out.gauge(
        "vestel_meter_reading_kwh",
        "Meter reading in kWh",
        electrical.meter_reading_kwh,
    )?;

    let limits = &s.limits;
    out.gauge(
        "vestel_evse_min_current_amperes",
        "EVSE minimum current in amperes",
        limits.evse_min_a,
    )?;
    out.gauge(
        "vestel_evse_max_current_amperes",
        "EVSE maximum current in amperes",
        limits.evse_max_a,
    )?;
    out.gauge(
        "vestel_cable_max_current_amperes",
        "Cable maximum current in amperes",
        limits.cable_max_a,
    )?;
    out.gauge(
        "vestel_session_max_current_amperes",
        "Session maximum current in amperes",
        s.session.max_current_a,
    )?;

    out.gauge("vestel_session_energy_wh", "Session energy in Wh", s.session.energy_wh)?;
    out.gauge(
        "vestel_session_duration_seconds",
        "Session duration in seconds",
        s.session.duration_s,
    )?;

    out.gauge(
        "vestel_dynamic_current_amperes",
        "Dynamic current setting in amperes",
        limits.dynamic_current_a,
    )?;
    out.gauge(
        "vestel_failsafe_current_amperes",
        "Failsafe current setting in amperes",
        limits.failsafe_current_a,
    )?;
    out.gauge(
        "vestel_failsafe_timeout_seconds",
        "Failsafe timeout in seconds",
        limits.failsafe_timeout_s,
    )?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&out.registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
