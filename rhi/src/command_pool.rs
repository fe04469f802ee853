//! Command pool: two sets of per-swap-chain-image command lists consumed
//! round-robin.
//!
//! [`CommandPool::update`] advances to the next list. When the index wraps the
//! pool flips to the other set and resets every list in it, waiting for any
//! work still in flight. The first update always reports a wraparound so the
//! caller runs its per-cycle housekeeping before the first frame.

use std::sync::Arc;

use crate::command::QueueType;
use crate::command_list::{CommandList, CommandListState};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::id::ObjectId;

const SET_COUNT: usize = 2;

pub struct CommandPool {
    name: String,
    swap_chain_id: ObjectId,
    sets: [Vec<CommandList>; SET_COUNT],
    set_index: usize,
    list_index: Option<usize>,
    list_count: usize,
}

impl std::fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPool")
            .field("name", &self.name)
            .field("swap_chain_id", &self.swap_chain_id)
            .field("set_index", &self.set_index)
            .field("list_index", &self.list_index)
            .field("list_count", &self.list_count)
            .finish()
    }
}

impl CommandPool {
    pub(crate) fn new(
        device: Arc<Device>,
        name: &str,
        swap_chain_id: ObjectId,
        list_count: u32,
    ) -> RhiResult<Self> {
        if list_count == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "command pool '{name}' needs at least one list per set"
            )));
        }
        let list_count = list_count as usize;
        let sets = std::array::from_fn(|set| {
            (0..list_count)
                .map(|index| {
                    CommandList::new(
                        device.clone(),
                        format!("{name}_{set}_{index}"),
                        QueueType::Graphics,
                    )
                })
                .collect()
        });
        log::debug!(
            "Allocated command pool '{}' ({} x {} lists)",
            name,
            SET_COUNT,
            list_count
        );

        Ok(Self {
            name: name.to_string(),
            swap_chain_id,
            sets,
            set_index: 0,
            list_index: None,
            list_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn swap_chain_id(&self) -> ObjectId {
        self.swap_chain_id
    }

    pub fn list_count(&self) -> usize {
        self.list_count
    }

    pub fn set_index(&self) -> usize {
        self.set_index
    }

    pub fn list_index(&self) -> Option<usize> {
        self.list_index
    }

    /// Advance to the next command list; returns `true` on wraparound.
    pub fn update(&mut self) -> RhiResult<bool> {
        let next = match self.list_index {
            None => {
                self.list_index = Some(0);
                self.reset_set(self.set_index)?;
                return Ok(true);
            }
            Some(index) => index + 1,
        };

        if next < self.list_count {
            self.list_index = Some(next);
            return Ok(false);
        }

        self.set_index = (self.set_index + 1) % SET_COUNT;
        self.list_index = Some(0);
        self.reset_set(self.set_index)?;
        Ok(true)
    }

    fn reset_set(&mut self, set: usize) -> RhiResult<()> {
        for list in &mut self.sets[set] {
            list.reset()?;
        }
        Ok(())
    }

    /// The list selected by the last `update`.
    pub fn current(&self) -> &CommandList {
        &self.sets[self.set_index][self.list_index.unwrap_or(0)]
    }

    pub fn current_mut(&mut self) -> &mut CommandList {
        &mut self.sets[self.set_index][self.list_index.unwrap_or(0)]
    }

    /// Wait for every submitted list in both sets.
    pub fn wait_all(&mut self) -> RhiResult<()> {
        for list in self.sets.iter_mut().flatten() {
            if list.state() == CommandListState::Submitted {
                list.wait()?;
            }
        }
        Ok(())
    }

    /// Mark every in-flight list as discarded, e.g. after a device loss.
    pub fn discard_all(&mut self) {
        for list in self.sets.iter_mut().flatten() {
            if list.state() == CommandListState::Submitted {
                list.discard();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;

    #[test]
    fn test_first_update_wraps() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let mut pool = device.allocate_command_pool("pool", ObjectId::new(), 2).unwrap();
        assert!(pool.update().unwrap());
        assert!(!pool.update().unwrap());
        assert!(pool.update().unwrap());
        assert_eq!(pool.set_index(), 1);
        assert_eq!(pool.list_index(), Some(0));
    }

    #[test]
    fn test_wraparound_resets_submitted_lists() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let mut pool = device.allocate_command_pool("pool", ObjectId::new(), 1).unwrap();
        assert!(pool.update().unwrap());
        {
            let cmd = pool.current_mut();
            cmd.begin().unwrap();
            cmd.end().unwrap();
            cmd.submit().unwrap();
        }
        // Set 1, then back to set 0 whose list is still Submitted.
        assert!(pool.update().unwrap());
        assert!(pool.update().unwrap());
        assert_eq!(pool.current().state(), CommandListState::Idle);
    }

    #[test]
    fn test_zero_lists_rejected() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        assert!(device.allocate_command_pool("pool", ObjectId::new(), 0).is_err());
    }
}
