//! Fixed table of 31 module slots: identity, liveness, commanded and
//! observed state, telemetry snapshot, in-flight request gates.
//!
//! Slots are permanent. Deregistration clears the liveness flags but keeps
//! the unique id, so the same physical module re-attaches to the same slot
//! for the rest of the session and a slot is never handed to a different
//! serial. Only `deregister_all` on a cold boot starts from a clean table.
use heapless::Vec;

use crate::error::RegistryError;
use crate::protocol::wire::ext_id::ModuleId;
use crate::protocol::wire::messages::{
    CellCommStatus1, Detail, Hardware, Status1, Status2, Status3,
};
use crate::protocol::wire::scale;

/// Number of assignable module slots.
pub const MAX_MODULES: usize = 31;
/// Largest cell string a module can report.
pub const MAX_CELLS: usize = 94;

//==================================================================================MODULE_STATE
/// Operational states a module can be commanded into or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ModuleState {
    #[default]
    Off = 0,
    Standby = 1,
    Precharge = 2,
    On = 3,
}

impl ModuleState {
    /// Decode the low status nibble; values above 3 are module-internal
    /// (fault, unknown) and do not map to a commanded state.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Off),
            1 => Some(Self::Standby),
            2 => Some(Self::Precharge),
            3 => Some(Self::On),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }
}

//==================================================================================MODULE_SLOT
/// One registry entry. Fields are directly readable by the host surface;
/// all mutation goes through [`ModuleRegistry`] so the single-writer and
/// identity invariants hold.
#[derive(Debug, Clone, Default)]
pub struct ModuleSlot {
    /// 32-bit module serial; zero means the slot was never bound.
    pub unique_id: u32,
    /// Manufacturer and part ids echoed from the announcement, kept so an
    /// operator-driven registration can rebuild the acknowledgement.
    pub mfg_id: u8,
    pub part_id: u8,
    pub registered: bool,
    pub responding: bool,

    /// State the module last reported (Status_1 low nibble).
    pub observed_state: ModuleState,
    /// State the controller last commanded.
    pub commanded_state: ModuleState,
    /// Status_1 high nibble: module fault/status bits.
    pub fault_bits: u8,

    pub voltage: f32,
    pub current: f32,
    pub soc: f32,
    pub soh: f32,

    /// Raw per-cell millivolt readings, sized by the reported cell count.
    pub cell_voltages: Vec<u16, MAX_CELLS>,
    /// Raw per-cell temperature readings, same sizing.
    pub cell_temperatures: Vec<u16, MAX_CELLS>,

    pub cell_lo: f32,
    pub cell_hi: f32,
    pub cell_avg: f32,
    pub cell_total: f32,
    pub temp_lo: f32,
    pub temp_hi: f32,
    pub temp_avg: f32,

    pub hardware: Hardware,

    pub cell_count_expected: u8,
    pub cell_count_min: u8,
    pub cell_count_max: u8,
    pub i2c_errors: u16,

    pub last_rx_tick: u32,
    pub status_request_tick: u32,
    pub cell_request_tick: u32,
    pub awaiting_status_reply: bool,
    pub awaiting_cell_reply: bool,

    pub message_count: u32,
    pub error_count: u32,

    /// WEB4 material provisioned to this module, absent until distributed.
    pub web4_device_key: Option<[u8; 64]>,
    pub web4_lct_key: Option<[u8; 64]>,
    pub web4_component_id: Option<[u8; 32]>,
}

impl ModuleSlot {
    /// Physical cell voltage in volts, `None` outside the string.
    pub fn cell_voltage(&self, index: usize) -> Option<f32> {
        self.cell_voltages.get(index).map(|&raw| scale::cell_voltage(raw))
    }

    /// Physical cell temperature in °C, `None` outside the string.
    pub fn cell_temperature(&self, index: usize) -> Option<f32> {
        self.cell_temperatures
            .get(index)
            .map(|&raw| scale::temperature(raw))
    }

    fn touch(&mut self, now: u32) {
        self.last_rx_tick = now;
        self.responding = true;
        self.message_count = self.message_count.wrapping_add(1);
    }

    /// Grow or shrink the cell vectors to the reported count. A zero count
    /// leaves the vectors untouched.
    fn size_cells(&mut self, count: u8) {
        if count == 0 {
            return;
        }
        let count = (count as usize).min(MAX_CELLS);
        self.cell_count_expected = count as u8;
        while self.cell_voltages.len() < count {
            let _ = self.cell_voltages.push(0);
            let _ = self.cell_temperatures.push(0);
        }
        self.cell_voltages.truncate(count);
        self.cell_temperatures.truncate(count);
    }
}

//==================================================================================REGISTRY
/// Mapping from assigned module id to slot, with smallest-free allocation.
#[derive(Default)]
pub struct ModuleRegistry {
    slots: [ModuleSlot; MAX_MODULES],
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, id: ModuleId) -> &ModuleSlot {
        &self.slots[id.index()]
    }

    pub(crate) fn slot_mut(&mut self, id: ModuleId) -> &mut ModuleSlot {
        &mut self.slots[id.index()]
    }

    /// Linear scan for a serial already bound to a slot.
    pub fn find_by_unique(&self, unique_id: u32) -> Option<ModuleId> {
        if unique_id == 0 {
            return None;
        }
        ModuleId::all().find(|id| self.slot(*id).unique_id == unique_id)
    }

    /// Bind a serial to a slot: the existing slot when the serial is known,
    /// otherwise the smallest never-bound slot. Returns the id and whether
    /// the serial was already known. The slot is claimed immediately so a
    /// concurrent announcement cannot race it, but `registered` only flips
    /// on [`mark_registered`] once the acknowledgement goes out.
    ///
    /// [`mark_registered`]: Self::mark_registered
    pub fn register(&mut self, unique_id: u32) -> Result<(ModuleId, bool), RegistryError> {
        if let Some(id) = self.find_by_unique(unique_id) {
            return Ok((id, true));
        }
        let id = ModuleId::all()
            .find(|id| self.slot(*id).unique_id == 0)
            .ok_or(RegistryError::RegistryFull)?;
        let slot = self.slot_mut(id);
        slot.unique_id = unique_id;
        Ok((id, false))
    }

    /// Complete a registration after the acknowledgement was handed to the
    /// driver.
    pub fn mark_registered(&mut self, id: ModuleId, now: u32) {
        let slot = self.slot_mut(id);
        slot.registered = true;
        slot.responding = true;
        slot.commanded_state = ModuleState::Off;
        slot.awaiting_status_reply = false;
        slot.awaiting_cell_reply = false;
        slot.last_rx_tick = now;
    }

    /// Clear liveness for one slot. The unique id is retained so the same
    /// physical module re-attaches to the same id.
    pub fn deregister(&mut self, id: ModuleId) {
        let slot = self.slot_mut(id);
        slot.registered = false;
        slot.responding = false;
        slot.commanded_state = ModuleState::Off;
        slot.awaiting_status_reply = false;
        slot.awaiting_cell_reply = false;
    }

    /// Deregister every slot; telemetry snapshots are retained for the
    /// host surface.
    pub fn deregister_all(&mut self) {
        for id in ModuleId::all() {
            self.deregister(id);
        }
    }

    /// Ids of all registered slots, ascending.
    pub fn registered_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        ModuleId::all().filter(|id| self.slot(*id).registered)
    }

    pub fn registered_count(&self) -> usize {
        self.registered_ids().count()
    }

    /// Highest commanded state across registered slots, `None` when the
    /// pack is empty.
    pub fn max_commanded_state(&self) -> Option<ModuleState> {
        self.registered_ids()
            .map(|id| self.slot(id).commanded_state)
            .max()
    }

    //==================================================================================UPDATES

    pub fn apply_status1(&mut self, id: ModuleId, msg: &Status1, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.awaiting_status_reply = false;
        if let Some(state) = ModuleState::from_raw(msg.state) {
            slot.observed_state = state;
        }
        slot.fault_bits = msg.status;
        slot.soc = scale::percent(msg.soc_raw);
        slot.soh = scale::percent(msg.soh_raw);
        slot.current = scale::module_current(msg.current_raw);
        slot.voltage = scale::module_voltage(msg.voltage_raw);
        slot.size_cells(msg.cell_count);
    }

    pub fn apply_status2(&mut self, id: ModuleId, msg: &Status2, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.awaiting_status_reply = false;
        slot.cell_lo = scale::cell_voltage(msg.cell_lo_raw);
        slot.cell_hi = scale::cell_voltage(msg.cell_hi_raw);
        slot.cell_avg = scale::cell_voltage(msg.cell_avg_raw);
        slot.cell_total = scale::cell_total_voltage(msg.cell_total_raw);
    }

    pub fn apply_status3(&mut self, id: ModuleId, msg: &Status3, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.awaiting_status_reply = false;
        slot.temp_lo = scale::temperature(msg.temp_lo_raw);
        slot.temp_hi = scale::temperature(msg.temp_hi_raw);
        slot.temp_avg = scale::temperature(msg.temp_avg_raw);
    }

    pub fn apply_hardware(&mut self, id: ModuleId, msg: &Hardware, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.hardware = *msg;
    }

    pub fn apply_detail(&mut self, id: ModuleId, msg: &Detail, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.awaiting_cell_reply = false;
        slot.size_cells(msg.cell_count_expected);
        let index = msg.cell_id as usize;
        if index < slot.cell_voltages.len() {
            slot.cell_voltages[index] = msg.volt_raw;
            slot.cell_temperatures[index] = msg.temp_raw;
        }
    }

    pub fn apply_cell_comm(&mut self, id: ModuleId, msg: &CellCommStatus1, now: u32) {
        let slot = self.slot_mut(id);
        slot.touch(now);
        slot.cell_count_min = msg.cell_count_min;
        slot.cell_count_max = msg.cell_count_max;
        slot.i2c_errors = msg.i2c_errors;
    }

    /// Record the WEB4 key halves handed to a module during key
    /// distribution. Fails when the slot is not registered.
    pub fn store_web4_keys(
        &mut self,
        id: ModuleId,
        device_key: [u8; 64],
        lct_key: [u8; 64],
    ) -> Result<(), RegistryError> {
        let slot = self.slot_mut(id);
        if !slot.registered {
            return Err(RegistryError::NotRegistered(id.raw()));
        }
        slot.web4_device_key = Some(device_key);
        slot.web4_lct_key = Some(lct_key);
        Ok(())
    }

    /// Record a module's component id.
    pub fn store_web4_component(
        &mut self,
        id: ModuleId,
        component_id: [u8; 32],
    ) -> Result<(), RegistryError> {
        let slot = self.slot_mut(id);
        if !slot.registered {
            return Err(RegistryError::NotRegistered(id.raw()));
        }
        slot.web4_component_id = Some(component_id);
        Ok(())
    }

    //==================================================================================AGGREGATES

    /// Sum of module voltages over registered slots not observed Off.
    pub fn pack_voltage(&self) -> f32 {
        self.registered_ids()
            .map(|id| self.slot(id))
            .filter(|s| s.observed_state != ModuleState::Off)
            .map(|s| s.voltage)
            .sum()
    }

    /// Parallel-pack convention: the current with the largest magnitude
    /// among registered slots not observed Off.
    pub fn pack_current(&self) -> f32 {
        let mut best = 0.0f32;
        for id in self.registered_ids() {
            let slot = self.slot(id);
            if slot.observed_state == ModuleState::Off {
                continue;
            }
            if absf(slot.current) > absf(best) {
                best = slot.current;
            }
        }
        best
    }

    /// Mean SOC over registered slots.
    pub fn pack_soc(&self) -> f32 {
        let mut total = 0.0f32;
        let mut count = 0u32;
        for id in self.registered_ids() {
            total += self.slot(id).soc;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            total / count as f32
        }
    }
}

fn absf(x: f32) -> f32 {
    if x < 0.0 {
        -x
    } else {
        x
    }
}
