//! SI quantities used by storage accounting and step durations.

use uom::si::f64::{Energy as UomEnergy, Power as UomPower, Time as UomTime};

// Public canonical unit types (SI, f64)
pub type Energy = UomEnergy;
pub type Power = UomPower;
pub type Time = UomTime;

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn minutes(v: f64) -> Time {
    use uom::si::time::minute;
    Time::new::<minute>(v)
}

#[inline]
pub fn hours(v: f64) -> Time {
    use uom::si::time::hour;
    Time::new::<hour>(v)
}

#[inline]
pub fn mw(v: f64) -> Power {
    use uom::si::power::megawatt;
    Power::new::<megawatt>(v)
}

#[inline]
pub fn mwh(v: f64) -> Energy {
    use uom::si::energy::megawatt_hour;
    Energy::new::<megawatt_hour>(v)
}

/// Express a duration in hours.
#[inline]
pub fn in_hours(t: Time) -> f64 {
    use uom::si::time::hour;
    t.get::<hour>()
}

/// Express an energy in megawatt-hours.
#[inline]
pub fn in_mwh(e: Energy) -> f64 {
    use uom::si::energy::megawatt_hour;
    e.get::<megawatt_hour>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_smoke() {
        let _dt = s(900.0);
        let _p = mw(1.5);
        let _e = mwh(2.0);
    }

    #[test]
    fn power_times_time_is_energy() {
        let e: Energy = mw(2.0) * minutes(30.0);
        assert!((in_mwh(e) - 1.0).abs() < 1e-12);
        assert!((in_hours(minutes(15.0)) - 0.25).abs() < 1e-12);
    }
}
