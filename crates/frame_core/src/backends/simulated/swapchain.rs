//! Scripted swapchain
//!
//! Hands out images round-robin unless a scripted outcome is queued. Clones
//! share the script, so a test can keep a handle after moving the swapchain
//! into the renderer.
//!
//! An image stays held from acquire until it is presented or released. When
//! every image is held the next acquire times out, the way a real
//! presentation engine starves.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use ash::vk::{self, Handle};

use crate::render::api::{AcquireOutcome, PresentOutcome, RenderTarget, Swapchain, SwapchainImageIndex};
use crate::render::RenderResult;

const SEMAPHORE_BASE: u64 = 0xA000_0000;
const RENDER_PASS_RAW: u64 = 0xB000_0000;
const FRAMEBUFFER_BASE: u64 = 0xC000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptedAcquire {
    Stale,
    Timeout,
    Index(u32),
}

#[derive(Debug)]
struct ScriptState {
    image_count: u32,
    extent: vk::Extent2D,
    next_image: u32,
    next_semaphore: u64,
    acquire_script: VecDeque<ScriptedAcquire>,
    present_script: VecDeque<PresentOutcome>,
    acquire_calls: usize,
    presented: Vec<SwapchainImageIndex>,
    released: Vec<SwapchainImageIndex>,
    held: HashSet<u32>,
    unconsumed: HashSet<vk::Semaphore>,
}

impl ScriptState {
    /// Next image in round-robin order that is not held
    fn next_free_image(&mut self) -> Option<u32> {
        let count = self.image_count.max(1);
        let index = (0..count)
            .map(|offset| (self.next_image + offset) % count)
            .find(|index| !self.held.contains(index))?;
        self.next_image = (index + 1) % count;
        Some(index)
    }

    /// The image went back to the presentation engine
    fn give_back(&mut self, index: SwapchainImageIndex) {
        if !self.held.remove(&index.0) {
            log::warn!("Image {} returned without being acquired", index);
        }
    }
}

/// Swapchain replaying queued outcomes
#[derive(Debug, Clone)]
pub struct ScriptedSwapchain {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedSwapchain {
    /// Swapchain with `image_count` 1280x720 images
    pub fn new(image_count: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                image_count: u32::try_from(image_count).unwrap_or(u32::MAX),
                extent: vk::Extent2D {
                    width: 1280,
                    height: 720,
                },
                next_image: 0,
                next_semaphore: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                acquire_calls: 0,
                presented: Vec::new(),
                released: Vec::new(),
                held: HashSet::new(),
                unconsumed: HashSet::new(),
            })),
        }
    }

    /// Use a different image size
    #[must_use]
    pub fn with_extent(self, width: u32, height: u32) -> Self {
        self.state.borrow_mut().extent = vk::Extent2D { width, height };
        self
    }

    /// Make the next acquire report a stale swapchain
    pub fn script_acquire_stale(&self) {
        self.state.borrow_mut().acquire_script.push_back(ScriptedAcquire::Stale);
    }

    /// Make the next acquire time out
    pub fn script_acquire_timeout(&self) {
        self.state.borrow_mut().acquire_script.push_back(ScriptedAcquire::Timeout);
    }

    /// Make the next acquire return a specific image index
    pub fn script_acquire_index(&self, index: u32) {
        self.state.borrow_mut().acquire_script.push_back(ScriptedAcquire::Index(index));
    }

    /// Make the next present report a stale swapchain
    pub fn script_present_stale(&self) {
        self.state.borrow_mut().present_script.push_back(PresentOutcome::Stale);
    }

    /// Number of acquire calls so far
    pub fn acquire_calls(&self) -> usize {
        self.state.borrow().acquire_calls
    }

    /// Images presented so far, in order
    pub fn presented(&self) -> Vec<SwapchainImageIndex> {
        self.state.borrow().presented.clone()
    }

    /// Images released unrendered so far, in order
    pub fn released(&self) -> Vec<SwapchainImageIndex> {
        self.state.borrow().released.clone()
    }

    /// Images acquired but neither presented nor released
    pub fn held_images(&self) -> usize {
        self.state.borrow().held.len()
    }

    /// Acquire semaphores no submission or release has waited on
    pub fn unconsumed_acquires(&self) -> usize {
        self.state.borrow().unconsumed.len()
    }
}

impl Swapchain for ScriptedSwapchain {
    fn image_count(&self) -> usize {
        self.state.borrow().image_count as usize
    }

    fn acquire_next_image(&mut self, _timeout: Duration) -> RenderResult<AcquireOutcome> {
        let mut state = self.state.borrow_mut();
        state.acquire_calls += 1;

        let index = match state.acquire_script.pop_front() {
            Some(ScriptedAcquire::Stale) => return Ok(AcquireOutcome::Stale),
            Some(ScriptedAcquire::Timeout) => return Ok(AcquireOutcome::Timeout),
            Some(ScriptedAcquire::Index(index)) => index,
            None => match state.next_free_image() {
                Some(index) => index,
                None => {
                    log::debug!("All {} image(s) held", state.image_count);
                    return Ok(AcquireOutcome::Timeout);
                }
            },
        };

        state.next_semaphore += 1;
        let ready = vk::Semaphore::from_raw(SEMAPHORE_BASE + state.next_semaphore);
        state.held.insert(index);
        state.unconsumed.insert(ready);
        Ok(AcquireOutcome::Acquired {
            index: SwapchainImageIndex(index),
            ready,
        })
    }

    fn render_target(&self, index: SwapchainImageIndex) -> RenderTarget {
        RenderTarget {
            render_pass: vk::RenderPass::from_raw(RENDER_PASS_RAW),
            framebuffer: vk::Framebuffer::from_raw(FRAMEBUFFER_BASE + u64::from(index.0)),
            extent: self.state.borrow().extent,
        }
    }

    fn present(&mut self, index: SwapchainImageIndex, _wait: vk::Semaphore) -> RenderResult<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        state.give_back(index);
        match state.present_script.pop_front() {
            Some(PresentOutcome::Stale) => Ok(PresentOutcome::Stale),
            _ => {
                state.presented.push(index);
                Ok(PresentOutcome::Presented)
            }
        }
    }

    fn release_image(&mut self, index: SwapchainImageIndex, ready: vk::Semaphore) -> RenderResult<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        state.unconsumed.remove(&ready);
        state.give_back(index);
        state.released.push(index);
        match state.present_script.pop_front() {
            Some(PresentOutcome::Stale) => Ok(PresentOutcome::Stale),
            _ => Ok(PresentOutcome::Presented),
        }
    }

    fn acquire_consumed(&mut self, ready: vk::Semaphore, _fence: vk::Fence) {
        self.state.borrow_mut().unconsumed.remove(&ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(swapchain: &mut ScriptedSwapchain) -> (SwapchainImageIndex, vk::Semaphore) {
        match swapchain.acquire_next_image(Duration::ZERO).unwrap() {
            AcquireOutcome::Acquired { index, ready } => (index, ready),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_round_robin_acquisition() {
        let mut swapchain = ScriptedSwapchain::new(3);
        let indices: Vec<_> = (0..5)
            .map(|_| {
                let (index, ready) = acquire(&mut swapchain);
                swapchain.acquire_consumed(ready, vk::Fence::null());
                swapchain.present(index, vk::Semaphore::null()).unwrap();
                index.0
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1]);
        assert_eq!(swapchain.held_images(), 0);
        assert_eq!(swapchain.unconsumed_acquires(), 0);
    }

    #[test]
    fn test_held_images_starve_acquire() {
        let mut swapchain = ScriptedSwapchain::new(2);
        let (first, _) = acquire(&mut swapchain);
        let (second, ready) = acquire(&mut swapchain);
        assert_eq!((first.0, second.0), (0, 1));
        assert_eq!(swapchain.held_images(), 2);

        assert_eq!(swapchain.acquire_next_image(Duration::ZERO).unwrap(), AcquireOutcome::Timeout);

        assert_eq!(swapchain.release_image(second, ready).unwrap(), PresentOutcome::Presented);
        assert_eq!(swapchain.held_images(), 1);
        assert_eq!(swapchain.unconsumed_acquires(), 1);
        assert_eq!(swapchain.released(), vec![SwapchainImageIndex(1)]);
        assert!(swapchain.presented().is_empty());

        let (again, _) = acquire(&mut swapchain);
        assert_eq!(again.0, 1);
    }

    #[test]
    fn test_scripted_outcomes_come_first() {
        let mut swapchain = ScriptedSwapchain::new(2);
        let observer = swapchain.clone();
        observer.script_acquire_stale();
        observer.script_present_stale();

        assert_eq!(swapchain.acquire_next_image(Duration::ZERO).unwrap(), AcquireOutcome::Stale);
        assert!(matches!(
            swapchain.acquire_next_image(Duration::ZERO).unwrap(),
            AcquireOutcome::Acquired { index: SwapchainImageIndex(0), .. }
        ));
        assert_eq!(
            swapchain.present(SwapchainImageIndex(0), vk::Semaphore::null()).unwrap(),
            PresentOutcome::Stale
        );
        assert_eq!(observer.acquire_calls(), 2);
        assert!(observer.presented().is_empty());
    }
}
