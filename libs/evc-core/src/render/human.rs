use std::fmt::{self, Display};

use crate::decoder::EnumValue;
use crate::snapshot::DeviceSnapshot;

const ABSENT: &str = "n/a";

/// Multi-line report for terminals
pub fn to_human(snapshot: &DeviceSnapshot) -> String {
    HumanReport(snapshot).to_string()
}

struct HumanReport<'a>(&'a DeviceSnapshot);

/// Value or the absent marker
struct Opt<T>(Option<T>);

impl<T: Display> Display for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str(ABSENT),
        }
    }
}

/// Value with its unit, or the bare absent marker
struct WithUnit<T>(Option<T>, &'static str);

impl<T: Display> Display for WithUnit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => write!(f, "{} {}", value, self.1),
            None => f.write_str(ABSENT),
        }
    }
}

fn label(state: &Option<EnumValue>) -> Opt<&str> {
    Opt(state.as_ref().map(|s| s.label.as_str()))
}

impl Display for HumanReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;

        writeln!(f, "== Identity ==")?;
        writeln!(f, "Serial:              {}", Opt(s.identity.serial.as_deref()))?;
        if let Some(watts) = s.identity.max_power_w {
            writeln!(
                f,
                "Max Power:           {} W ({:.2} kW)",
                watts,
                f64::from(watts) / 1000.0
            )?;
        }
        writeln!(f, "Phases:              {}", label(&s.identity.phases))?;

        writeln!(f, "\n== States ==")?;
        writeln!(f, "Chargepoint State:   {}", label(&s.states.chargepoint))?;
        writeln!(f, "Charging State:      {}", label(&s.states.charging))?;
        writeln!(f, "Equipment State:     {}", label(&s.states.equipment))?;
        writeln!(f, "Cable State:         {}", label(&s.states.cable))?;
        writeln!(f, "EVSE Fault Code:     {}", Opt(s.states.fault_code))?;

        writeln!(f, "\n== Electricals ==")?;
        let electrical = &s.electrical;
        for ((phase, current), (_, voltage)) in electrical
            .current_a
            .iter()
            .zip(electrical.voltage_v.iter())
        {
            if let Some(amps) = current {
                writeln!(f, "Current L{}:       {:.2} A", phase, amps)?;
            }
            if let Some(volts) = voltage {
                writeln!(f, "Voltage L{}:       {} V", phase, volts)?;
            }
        }
        for (phase, watts) in electrical.power_w.iter() {
            if let Some(watts) = watts {
                writeln!(f, "Power L{}:         {} W", phase, watts)?;
            }
        }
        if let Some(total) = electrical.total_power_w {
            writeln!(f, "Active Power Total:  {:.2} kW", f64::from(total) / 1000.0)?;
        }
        if let Some(kwh) = electrical.meter_reading_kwh {
            writeln!(f, "Meter Reading:       {:.1} kWh", kwh)?;
        }

        writeln!(f, "\n== Limits & Session ==")?;
        match (s.limits.evse_min_a, s.limits.evse_max_a) {
            (None, None) => writeln!(f, "EVSE Min/Max Current: {}", ABSENT)?,
            (min, max) => writeln!(
                f,
                "EVSE Min/Max Current: {} / {}",
                Opt(min),
                WithUnit(max, "A")
            )?,
        }
        writeln!(f, "Cable Max Current:    {}", WithUnit(s.limits.cable_max_a, "A"))?;
        writeln!(f, "Session Max Current:  {}", WithUnit(s.session.max_current_a, "A"))?;
        match s.session.energy_wh {
            Some(wh) => writeln!(f, "Session Energy:       {:.3} kWh", f64::from(wh) / 1000.0)?,
            None => writeln!(f, "Session Energy:       {}", ABSENT)?,
        }
        writeln!(f, "Session Duration:     {}", WithUnit(s.session.duration_s, "s"))?;

        writeln!(f, "\n== Current Settings ==")?;
        let limits = &s.limits;
        writeln!(f, "Dynamic Current:     {}", WithUnit(limits.dynamic_current_a, "A"))?;
        writeln!(f, "Failsafe Current:    {}", WithUnit(limits.failsafe_current_a, "A"))?;
        writeln!(f, "Failsafe Timeout:    {}", WithUnit(limits.failsafe_timeout_s, "s"))?;

        if !s.failures.is_empty() {
            writeln!(f, "\n== Read Failures ==")?;
            for failure in &s.failures {
                writeln!(f, "{}: {}", failure.batch, failure.error)?;
            }
        }
        Ok(())
    }
}
