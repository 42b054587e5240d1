//! Numeric scaling between raw wire integers and physical units.
//!
//! The constants are part of the wire contract and must not drift:
//!
//! | quantity            | conversion                      |
//! |---------------------|---------------------------------|
//! | module voltage      | `raw_u16 × 0.015` V             |
//! | module current      | `raw_u16 × 0.02 − 655.36` A     |
//! | cell voltage        | `raw_u16 × 0.001` V             |
//! | cell total voltage  | `raw_u16 × 0.015` V             |
//! | temperature         | `raw_u16 × 0.01 − 55.35` °C     |
//! | SOC / SOH           | `raw_u8 × 0.5` %                |

pub fn module_voltage(raw: u16) -> f32 {
    raw as f32 * 0.015
}

pub fn module_voltage_raw(volts: f32) -> u16 {
    (volts / 0.015 + 0.5) as u16
}

pub fn module_current(raw: u16) -> f32 {
    raw as f32 * 0.02 - 655.36
}

pub fn module_current_raw(amps: f32) -> u16 {
    ((amps + 655.36) / 0.02 + 0.5) as u16
}

pub fn cell_voltage(raw: u16) -> f32 {
    raw as f32 * 0.001
}

pub fn cell_voltage_raw(volts: f32) -> u16 {
    (volts / 0.001 + 0.5) as u16
}

pub fn cell_total_voltage(raw: u16) -> f32 {
    raw as f32 * 0.015
}

pub fn temperature(raw: u16) -> f32 {
    raw as f32 * 0.01 - 55.35
}

pub fn temperature_raw(celsius: f32) -> u16 {
    ((celsius + 55.35) / 0.01 + 0.5) as u16
}

pub fn percent(raw: u8) -> f32 {
    raw as f32 * 0.5
}

pub fn percent_raw(pct: f32) -> u8 {
    (pct / 0.5 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        let d = a - b;
        (if d < 0.0 { -d } else { d }) < 1e-3
    }

    #[test]
    fn module_voltage_scaling() {
        // 0x0C80 = 3200 → 48.00 V.
        assert!(close(module_voltage(0x0C80), 48.0));
        assert_eq!(module_voltage_raw(48.0), 0x0C80);
    }

    #[test]
    fn module_current_scaling() {
        // 0x27C0 = 10176 → 10176 × 0.02 − 655.36 = −451.84 A.
        assert!(close(module_current(0x27C0), -451.84));
        // Mid-scale is zero amps.
        assert!(close(module_current(32768), 0.0));
        assert_eq!(module_current_raw(0.0), 32768);
    }

    #[test]
    fn cell_voltage_scaling() {
        assert!(close(cell_voltage(3300), 3.3));
        assert_eq!(cell_voltage_raw(3.3), 3300);
    }

    #[test]
    fn temperature_scaling() {
        // 25.0 °C → raw 8035.
        assert!(close(temperature(8035), 25.0));
        assert_eq!(temperature_raw(25.0), 8035);
        // Raw zero is the low clamp.
        assert!(close(temperature(0), -55.35));
    }

    #[test]
    fn percent_scaling() {
        assert!(close(percent(200), 100.0));
        assert!(close(percent(0x55), 42.5));
        assert_eq!(percent_raw(100.0), 200);
    }

    #[test]
    fn round_trips() {
        for raw in [0u16, 1, 1000, 3200, 40000, 65535] {
            assert_eq!(module_voltage_raw(module_voltage(raw)), raw);
        }
        for raw in [0u16, 100, 32768, 65535] {
            assert_eq!(module_current_raw(module_current(raw)), raw);
        }
        for raw in [0u8, 1, 100, 200, 255] {
            assert_eq!(percent_raw(percent(raw)), raw);
        }
    }
}
