//! Vulkan backend
//!
//! Adapters from the collaborator traits onto `ash`. Instance, device,
//! surface, swapchain, render pass and pipeline creation stay with the
//! application; these types only consume the resulting handles.

mod allocator;
mod device;
mod swapchain;

pub use allocator::VulkanBufferAllocator;
pub use device::VulkanDevice;
pub use swapchain::VulkanSwapchain;

use ash::vk;

use crate::render::RenderError;

/// Out-of-memory results become allocation failures, anything else stays a
/// device error
pub(crate) fn allocation_error(what: &str, result: vk::Result) -> RenderError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL => RenderError::allocation(format!("{what}: {result:?}")),
        other => RenderError::Device(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_maps_to_allocation_failure() {
        assert!(matches!(
            allocation_error("buffer", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            RenderError::AllocationFailure { .. }
        ));
        assert!(matches!(
            allocation_error("buffer", vk::Result::ERROR_DEVICE_LOST),
            RenderError::Device(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
