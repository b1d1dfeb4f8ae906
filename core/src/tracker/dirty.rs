//! Dirty flags

/// Sampler slots one [`DirtyFlags`] mask can track
pub const MAX_SAMPLER_SLOTS: usize = 32;

bitflags::bitflags! {
    /// State that must be revalidated before the next draw
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Dirty: u16 {
        /// Attachments changed; the open pass (if any) is stale
        const RENDER_PASS = 1 << 0;
        const PIPELINE = 1 << 1;
        /// Declarations, step rates or vertex shader changed
        const VERTEX_LAYOUT = 1 << 2;
        const VERTEX_BUFFERS = 1 << 3;
        const INDEX_BUFFER = 1 << 4;
        const VIEWPORT = 1 << 5;
        const SCISSOR = 1 << 6;
        const BLEND_FACTOR = 1 << 7;
        const STENCIL_REF = 1 << 8;
        const UNIFORMS = 1 << 9;
    }
}

impl Dirty {
    /// Everything bound after the pipeline, invalidated by a pipeline switch
    pub const DOWNSTREAM: Dirty = Dirty::VERTEX_BUFFERS
        .union(Dirty::INDEX_BUFFER)
        .union(Dirty::VIEWPORT)
        .union(Dirty::SCISSOR)
        .union(Dirty::BLEND_FACTOR)
        .union(Dirty::STENCIL_REF)
        .union(Dirty::UNIFORMS);
}

/// Dirty flags plus one bit per sampler slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags {
    pub state: Dirty,
    pub samplers: u32,
    slot_mask: u32,
}

impl DirtyFlags {
    /// All dirty, for `slots` sampler slots (at most [`MAX_SAMPLER_SLOTS`])
    pub fn new(slots: usize) -> Self {
        let slot_mask = if slots >= MAX_SAMPLER_SLOTS {
            u32::MAX
        } else {
            (1u32 << slots) - 1
        };
        Self {
            state: Dirty::all(),
            samplers: slot_mask,
            slot_mask,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.state.is_empty() && self.samplers == 0
    }

    pub fn contains(&self, flags: Dirty) -> bool {
        self.state.contains(flags)
    }

    pub fn set(&mut self, flags: Dirty) {
        self.state |= flags;
    }

    pub fn clear(&mut self, flags: Dirty) {
        self.state &= !flags;
    }

    pub fn sampler(&self, slot: usize) -> bool {
        self.samplers & slot_bit(slot) != 0
    }

    pub fn set_sampler(&mut self, slot: usize) {
        self.samplers |= slot_bit(slot) & self.slot_mask;
    }

    pub fn set_all_samplers(&mut self) {
        self.samplers = self.slot_mask;
    }

    pub fn clear_sampler(&mut self, slot: usize) {
        self.samplers &= !slot_bit(slot);
    }

    /// Dirty sampler slots, lowest first
    pub fn dirty_samplers(&self) -> impl Iterator<Item = usize> + use<> {
        let mut bits = self.samplers;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let slot = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(slot)
        })
    }

    /// Marks everything bound inside a pass dirty. The vertex layout does not
    /// depend on the pass and keeps its flag.
    pub fn reset_for_new_pass(&mut self) {
        let layout = self.state & Dirty::VERTEX_LAYOUT;
        self.state = (Dirty::all() - Dirty::RENDER_PASS - Dirty::VERTEX_LAYOUT) | layout;
        self.samplers = self.slot_mask;
    }
}

/// Mask bit of `slot`, zero past the last trackable slot
fn slot_bit(slot: usize) -> u32 {
    u32::try_from(slot)
        .ok()
        .and_then(|slot| 1u32.checked_shl(slot))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_all_dirty() {
        let flags = DirtyFlags::new(16);
        assert_eq!(flags.state, Dirty::all());
        assert_eq!(flags.samplers, 0xFFFF);
        assert!(!flags.is_clean());
    }

    #[test]
    fn test_full_sampler_mask() {
        let mut flags = DirtyFlags::new(32);
        assert_eq!(flags.samplers, u32::MAX);
        flags.samplers = 0;
        flags.set_sampler(31);
        assert!(flags.sampler(31));
    }

    #[test]
    fn test_out_of_range_sampler_is_ignored() {
        let mut flags = DirtyFlags::new(4);
        flags.samplers = 0;
        flags.set_sampler(6);
        assert_eq!(flags.samplers, 0);
    }

    #[test]
    fn test_slots_past_mask_width_are_ignored() {
        let mut flags = DirtyFlags::new(40);
        assert_eq!(flags.samplers, u32::MAX);
        flags.samplers = 0;
        flags.set_sampler(35);
        assert!(!flags.sampler(35));
        flags.clear_sampler(35);
        assert_eq!(flags.samplers, 0);
    }

    #[test]
    fn test_dirty_sampler_iteration() {
        let mut flags = DirtyFlags::new(16);
        flags.samplers = 0;
        flags.set_sampler(3);
        flags.set_sampler(0);
        flags.set_sampler(9);
        assert_eq!(flags.dirty_samplers().collect::<Vec<_>>(), vec![0, 3, 9]);
    }

    #[test]
    fn test_reset_for_new_pass_keeps_pass_clean() {
        let mut flags = DirtyFlags::new(8);
        flags.state = Dirty::empty();
        flags.samplers = 0;
        flags.reset_for_new_pass();
        assert!(!flags.contains(Dirty::RENDER_PASS));
        assert!(!flags.contains(Dirty::VERTEX_LAYOUT));
        assert!(flags.contains(Dirty::PIPELINE | Dirty::VIEWPORT));
        assert_eq!(flags.samplers, 0xFF);
    }
}
