use std::ops::Deref;

use ash::vk;

/// Rounds `value` up to the next multiple of `alignment`. Works for any non-zero alignment.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    value.div_ceil(alignment) * alignment
}

pub fn aligned_size(value: u32, alignment: u32) -> u32 {
    assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

pub fn find_memorytype_index(
    memory_req: &vk::MemoryRequirements,
    memory_prop: &vk::PhysicalDeviceMemoryProperties,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_prop.memory_types[..memory_prop.memory_type_count as _]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            (1 << index) & memory_req.memory_type_bits != 0
                && memory_type.property_flags & flags == flags
        })
        .map(|(index, _memory_type)| index as _)
}

/// Owns resources that were created one after another and releases them last to first.
pub struct ReverseDropVec<T>(Vec<T>);

impl<T> From<Vec<T>> for ReverseDropVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> FromIterator<T> for ReverseDropVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut items = Self(vec![]);
        items.0.extend(iter);
        items
    }
}

impl<T> Deref for ReverseDropVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Drop for ReverseDropVec<T> {
    fn drop(&mut self) {
        while let Some(item) = self.0.pop() {
            drop(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_handles_non_power_of_two() {
        assert_eq!(align_up(0, 48), 0);
        assert_eq!(align_up(1, 48), 48);
        assert_eq!(align_up(48, 48), 48);
        assert_eq!(align_up(49, 48), 96);
    }

    #[test]
    fn aligned_size_rounds_to_power_of_two() {
        assert_eq!(aligned_size(4, 16), 16);
        assert_eq!(aligned_size(32, 16), 32);
    }

    #[test]
    fn memory_type_respects_type_bits_and_flags() {
        let mut memory_prop = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        memory_prop.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_prop.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        memory_prop.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

        let memory_req = vk::MemoryRequirements {
            memory_type_bits: 0b100,
            ..Default::default()
        };
        assert_eq!(
            find_memorytype_index(
                &memory_req,
                &memory_prop,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
            ),
            Some(2)
        );
        assert_eq!(
            find_memorytype_index(
                &memory_req,
                &memory_prop,
                vk::MemoryPropertyFlags::HOST_VISIBLE
            ),
            None
        );
    }

    #[test]
    fn reverse_drop_vec_releases_last_to_first() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Tracked(u32, Rc<RefCell<Vec<u32>>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.1.borrow_mut().push(self.0);
            }
        }

        let log = Rc::new(RefCell::new(vec![]));
        let items: ReverseDropVec<Tracked> =
            (0..3).map(|index| Tracked(index, log.clone())).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].0, 1);

        drop(items);
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn failed_collect_releases_last_to_first() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Tracked(u32, Rc<RefCell<Vec<u32>>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.1.borrow_mut().push(self.0);
            }
        }

        let log = Rc::new(RefCell::new(vec![]));
        let result: Result<ReverseDropVec<Tracked>, u32> = (0..4)
            .map(|index| match index {
                3 => Err(index),
                _ => Ok(Tracked(index, log.clone())),
            })
            .collect();

        assert_eq!(result.err(), Some(3));
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
    }
}
