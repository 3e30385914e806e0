use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::SequencerError;

/// Identity of one page-rendering surface (a web view / tab / popup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SurfaceId(u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Opaque frame identity. Minted by [`FrameRegistry`] only, so handles are
/// never reused, not even after their surface is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameHandle {
    surface: SurfaceId,
    frame: u64,
}

impl FrameHandle {
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/frame-{}", self.surface, self.frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub handle: FrameHandle,
    pub is_main_frame: bool,
    /// `None` until the frame commits its first document.
    pub url: Option<Url>,
    pub security_origin: String,
}

impl FrameInfo {
    pub fn surface(&self) -> SurfaceId {
        self.handle.surface
    }
}

#[derive(Debug, Default)]
pub struct FrameRegistry {
    next_surface: u64,
    next_frame: u64,
    frames: BTreeMap<FrameHandle, FrameInfo>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new surface and return its main frame. A surface opened by
    /// another frame starts out with the opener's security origin.
    pub fn create_surface(&mut self, opener: Option<FrameHandle>) -> FrameInfo {
        let security_origin = opener
            .and_then(|handle| self.frames.get(&handle))
            .map(|info| info.security_origin.clone())
            .unwrap_or_else(opaque_origin);

        self.next_surface += 1;
        let surface = SurfaceId(self.next_surface);
        self.insert(surface, true, security_origin)
    }

    pub fn create_child(&mut self, parent: FrameHandle) -> Result<FrameInfo, SequencerError> {
        let parent = self
            .frames
            .get(&parent)
            .ok_or(SequencerError::UnknownFrame(parent))?;
        let surface = parent.surface();
        let security_origin = parent.security_origin.clone();
        Ok(self.insert(surface, false, security_origin))
    }

    fn insert(&mut self, surface: SurfaceId, is_main_frame: bool, origin: String) -> FrameInfo {
        self.next_frame += 1;
        let handle = FrameHandle {
            surface,
            frame: self.next_frame,
        };
        let info = FrameInfo {
            handle,
            is_main_frame,
            url: None,
            security_origin: origin,
        };
        self.frames.insert(handle, info.clone());
        info
    }

    pub fn get(&self, handle: FrameHandle) -> Option<&FrameInfo> {
        self.frames.get(&handle)
    }

    pub fn lookup(&self, handle: FrameHandle) -> Result<&FrameInfo, SequencerError> {
        self.get(handle).ok_or(SequencerError::UnknownFrame(handle))
    }

    /// Record the document a frame has committed to.
    pub fn commit_url(&mut self, handle: FrameHandle, url: &Url) {
        if let Some(info) = self.frames.get_mut(&handle) {
            info.security_origin = url.origin().ascii_serialization();
            info.url = Some(url.clone());
        }
    }

    /// Frames of a surface, main frame first.
    pub fn frames_of(&self, surface: SurfaceId) -> Vec<FrameHandle> {
        let mut handles: Vec<_> = self
            .frames
            .values()
            .filter(|info| info.surface() == surface)
            .collect();
        handles.sort_by_key(|info| (!info.is_main_frame, info.handle));
        handles.into_iter().map(|info| info.handle).collect()
    }

    pub fn remove_surface(&mut self, surface: SurfaceId) -> Vec<FrameHandle> {
        let removed = self.frames_of(surface);
        for handle in &removed {
            self.frames.remove(handle);
        }
        removed
    }

    pub fn contains_surface(&self, surface: SurfaceId) -> bool {
        self.frames.values().any(|info| info.surface() == surface)
    }
}

fn opaque_origin() -> String {
    String::from("null")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surfaces_never_share_handles() {
        let mut registry = FrameRegistry::new();
        let first = registry.create_surface(None);
        let child = registry.create_child(first.handle).unwrap();
        let popup = registry.create_surface(Some(first.handle));

        assert!(first.is_main_frame);
        assert!(!child.is_main_frame);
        assert!(popup.is_main_frame);
        assert_ne!(first.handle, popup.handle);
        assert_ne!(child.handle, popup.handle);
        assert_ne!(first.surface(), popup.surface());
    }

    #[test]
    fn handles_are_not_reused_after_surface_teardown() {
        let mut registry = FrameRegistry::new();
        let first = registry.create_surface(None);
        registry.remove_surface(first.surface());
        let second = registry.create_surface(None);

        assert_ne!(first.handle, second.handle);
        assert!(registry.get(first.handle).is_none());
    }

    #[test]
    fn popup_inherits_opener_origin() {
        let mut registry = FrameRegistry::new();
        let opener = registry.create_surface(None);
        let url = Url::parse("http://localhost:8084/page").unwrap();
        registry.commit_url(opener.handle, &url);

        let popup = registry.create_surface(Some(opener.handle));
        assert_eq!(popup.security_origin, "http://localhost:8084");
        assert!(popup.url.is_none());
    }

    #[test]
    fn frames_of_lists_main_frame_first() {
        let mut registry = FrameRegistry::new();
        let main = registry.create_surface(None);
        let child = registry.create_child(main.handle).unwrap();

        assert_eq!(
            registry.frames_of(main.surface()),
            vec![main.handle, child.handle]
        );
    }

    #[test]
    fn child_of_unknown_frame_is_rejected() {
        let mut registry = FrameRegistry::new();
        let main = registry.create_surface(None);
        registry.remove_surface(main.surface());

        assert!(matches!(
            registry.create_child(main.handle),
            Err(SequencerError::UnknownFrame(_))
        ));
    }
}
