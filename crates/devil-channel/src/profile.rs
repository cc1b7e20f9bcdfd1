//! Device profiles: which registers a device has and what their bits mean.
//!
//! The channel is generic; a profile is handed to it at construction and
//! decides which registers are read during the handshake.

use serde::{Deserialize, Serialize};

/// One register the device exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// Human-readable name.
    pub name: String,
    /// Device-assigned register index.
    pub index: u16,
    /// Whether the register holds a two's complement value.
    #[serde(default)]
    pub signed: bool,
}

impl RegisterSpec {
    /// Creates a register spec.
    pub fn new(name: &str, index: u16, signed: bool) -> Self {
        Self {
            name: name.to_string(),
            index,
            signed,
        }
    }
}

/// A named bit (or bit group) within a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
    /// Flag name.
    pub name: String,
    /// Bit mask.
    pub mask: u32,
}

/// A fault the device can report through its condition register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCondition {
    /// Bit mask within the condition register.
    pub mask: u32,
    /// Short identifier, e.g. `ADC_OVER`.
    pub short_name: String,
    /// Description for display.
    pub long_name: String,
}

/// Register map and bit schema of one device generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Profile name.
    pub name: String,
    /// Registers synchronized during the handshake, in read order.
    pub registers: Vec<RegisterSpec>,
    /// Register whose bits are described by `flags`.
    pub control_register: Option<u16>,
    /// Named bits of the control register.
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
    /// Register reporting error conditions.
    pub condition_register: Option<u16>,
    /// Error conditions encoded in the condition register.
    #[serde(default)]
    pub error_conditions: Vec<ErrorCondition>,
    /// Display names of the published streams, by index.
    #[serde(default)]
    pub stream_names: Vec<String>,
}

/// EVIL 2 control register bits.
pub mod evil2 {
    /// PID controller enabled (active-low reset released).
    pub const PID_RST_N: u32 = 1 << 0;
    /// Ramp generator enabled.
    pub const RAMP_RST_N: u32 = 1 << 1;
    /// Output driven by the ramp instead of the PID controller.
    pub const OUTPUT_SEL: u32 = 1 << 2;
    /// PID polarity inverted.
    pub const PID_POLARITY: u32 = 1 << 3;
    /// Relocking (lock detection) enabled.
    pub const LD_ON: u32 = 1 << 4;
    /// Bits that together select sweeping versus controlling.
    pub const SWEEPING_MASK: u32 = PID_RST_N | RAMP_RST_N | OUTPUT_SEL;
    /// Value of [`SWEEPING_MASK`] bits while sweeping.
    pub const SWEEPING_STATE: u32 = RAMP_RST_N | OUTPUT_SEL;

    /// Register index of the system control flags.
    pub const SYSTEM_CONTROL: u16 = 0;
    /// Register index of the system condition flags.
    pub const SYSTEM_CONDITION: u16 = 30;
}

impl DeviceProfile {
    /// Profile of the EVIL 2 laser lock controller.
    pub fn evil2() -> Self {
        let registers = vec![
            RegisterSpec::new("center", 1, true),
            RegisterSpec::new("range", 2, false),
            RegisterSpec::new("frequency", 3, false),
            RegisterSpec::new("inputOffset", 4, true),
            RegisterSpec::new("outputOffset", 5, true),
            RegisterSpec::new("pGain", 6, false),
            RegisterSpec::new("iGain", 7, false),
            RegisterSpec::new("dGain", 8, false),
            RegisterSpec::new("filterResponse", 9, true),
            RegisterSpec::new("threshold", 10, false),
            RegisterSpec::new("ttlExp", 11, false),
            RegisterSpec::new("systemControl", evil2::SYSTEM_CONTROL, false),
            RegisterSpec::new("systemCondition", evil2::SYSTEM_CONDITION, false),
        ];
        let flags = [
            ("PID_RST_N", evil2::PID_RST_N),
            ("RAMP_RST_N", evil2::RAMP_RST_N),
            ("OUTPUT_SEL", evil2::OUTPUT_SEL),
            ("PID_POLARITY", evil2::PID_POLARITY),
            ("LD_ON", evil2::LD_ON),
        ]
        .into_iter()
        .map(|(name, mask)| FlagSpec {
            name: name.to_string(),
            mask,
        })
        .collect();

        Self {
            name: "evil2".to_string(),
            registers,
            control_register: Some(evil2::SYSTEM_CONTROL),
            flags,
            condition_register: Some(evil2::SYSTEM_CONDITION),
            error_conditions: vec![ErrorCondition {
                mask: 0b1,
                short_name: "ADC_OVER".to_string(),
                long_name: "Analog input out of range".to_string(),
            }],
            stream_names: vec![
                "ADC (error signal)".to_string(),
                "PID/ramp output".to_string(),
                "Relocking slow lowpass filter".to_string(),
                "Relocking filter difference".to_string(),
            ],
        }
    }

    /// Look up a register by name.
    pub fn register(&self, name: &str) -> Option<&RegisterSpec> {
        self.registers.iter().find(|r| r.name == name)
    }

    /// Mask of the named control flag.
    pub fn flag(&self, name: &str) -> Option<u32> {
        self.flags.iter().find(|f| f.name == name).map(|f| f.mask)
    }

    /// Names of the flags set in `value`.
    pub fn active_flags(&self, value: u32) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|f| value & f.mask == f.mask)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Error conditions signalled by a condition register value.
    pub fn active_error_conditions(&self, value: u32) -> Vec<ErrorCondition> {
        self.error_conditions
            .iter()
            .filter(|c| value & c.mask != 0)
            .cloned()
            .collect()
    }

    /// Display name of a stream.
    pub fn stream_name(&self, stream_idx: u16) -> Option<&str> {
        self.stream_names
            .get(usize::from(stream_idx))
            .map(String::as_str)
    }
}

/// Whether EVIL 2 control flags describe a sweeping (ramp output) state.
pub fn is_sweeping(flags: u32) -> bool {
    flags & evil2::SWEEPING_MASK == evil2::SWEEPING_STATE
}

/// Control flags that switch between sweeping and controlling.
///
/// Only the output select bit decides the current mode, but every bit of
/// [`evil2::SWEEPING_MASK`] is rewritten so that inconsistent states recover.
pub fn toggle_sweep(flags: u32) -> u32 {
    let sweeping = flags & evil2::OUTPUT_SEL != 0;
    let base = flags & !evil2::SWEEPING_MASK;
    if sweeping {
        base | (!evil2::SWEEPING_STATE & evil2::SWEEPING_MASK)
    } else {
        base | evil2::SWEEPING_STATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evil2_register_map() {
        let profile = DeviceProfile::evil2();
        assert_eq!(profile.registers.len(), 13);
        assert!(profile.register("center").unwrap().signed);
        assert!(!profile.register("range").unwrap().signed);
        assert_eq!(profile.register("systemCondition").unwrap().index, 30);
        assert_eq!(profile.stream_name(1), Some("PID/ramp output"));
        assert_eq!(profile.stream_name(4), None);
    }

    #[test]
    fn test_error_conditions() {
        let profile = DeviceProfile::evil2();
        assert!(profile.active_error_conditions(0).is_empty());
        let active = profile.active_error_conditions(0b11);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].short_name, "ADC_OVER");
    }

    #[test]
    fn test_active_flags() {
        let profile = DeviceProfile::evil2();
        let flags = profile.active_flags(evil2::LD_ON | evil2::PID_RST_N);
        assert_eq!(flags, vec!["PID_RST_N", "LD_ON"]);
        assert_eq!(profile.flag("OUTPUT_SEL"), Some(4));
    }

    #[test]
    fn test_toggle_sweep() {
        let controlling = evil2::PID_RST_N | evil2::LD_ON;
        assert!(!is_sweeping(controlling));
        let sweeping = toggle_sweep(controlling);
        assert!(is_sweeping(sweeping));
        assert_eq!(sweeping & evil2::LD_ON, evil2::LD_ON);
        let back = toggle_sweep(sweeping);
        assert!(!is_sweeping(back));
        assert_eq!(back & evil2::SWEEPING_MASK, evil2::PID_RST_N);
    }

    #[test]
    fn test_profile_from_json() {
        let json = r#"{
            "name": "custom",
            "registers": [{"name": "gain", "index": 4}],
            "control_register": null,
            "condition_register": null
        }"#;
        let profile: DeviceProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.registers[0].index, 4);
        assert!(!profile.registers[0].signed);
        assert!(profile.flags.is_empty());
    }
}
