//! Conventional table and column names.
//!
//! The model itself is schema-free; these names are what the built-in
//! controllers and the reference solver agree on.

pub const BUS: &str = "bus";
pub const LOAD: &str = "load";
pub const SGEN: &str = "sgen";
pub const STORAGE: &str = "storage";
pub const TRAFO: &str = "trafo";
pub const EXT_GRID: &str = "ext_grid";

pub const RES_BUS: &str = "res_bus";
pub const RES_EXT_GRID: &str = "res_ext_grid";

pub const P_MW: &str = "p_mw";
pub const VM_PU: &str = "vm_pu";
pub const R_PU: &str = "r_pu";
pub const BUS_REF: &str = "bus";
pub const LV_BUS: &str = "lv_bus";
pub const TAP_POS: &str = "tap_pos";
pub const TAP_NEUTRAL: &str = "tap_neutral";
pub const TAP_MIN: &str = "tap_min";
pub const TAP_MAX: &str = "tap_max";
pub const TAP_STEP_PERCENT: &str = "tap_step_percent";
pub const SOC_PERCENT: &str = "soc_percent";
pub const MAX_E_MWH: &str = "max_e_mwh";
