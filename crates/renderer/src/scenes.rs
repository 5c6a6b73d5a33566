//! Ordered set of precompiled scene programs with a single active selection.
//!
//! The registry can only be built from its first program, so `active()` is
//! always backed by a registered entry. Programs are never removed.

use std::fmt;

/// Sequential identifier handed out by [`SceneRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(usize);

impl SceneId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("scene {id} is not registered ({len} scenes available)")]
    OutOfRange { id: SceneId, len: usize },
}

/// Display hooks the overlay needs from a registered program.
pub trait SceneLabel {
    fn label(&self) -> &str;

    /// True when the program runs a fallback because its own shaders failed.
    fn is_degraded(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct SceneRegistry<P> {
    programs: Vec<P>,
    active: usize,
}

impl<P> SceneRegistry<P> {
    /// Creates a registry whose first (and active) scene is `first`.
    pub fn new(first: P) -> Self {
        Self {
            programs: vec![first],
            active: 0,
        }
    }

    /// Appends a program and returns its id.
    pub fn register(&mut self, program: P) -> SceneId {
        self.programs.push(program);
        SceneId(self.programs.len() - 1)
    }

    /// Makes `id` the active scene.
    pub fn select(&mut self, id: SceneId) -> Result<(), SceneError> {
        if id.0 >= self.programs.len() {
            return Err(SceneError::OutOfRange {
                id,
                len: self.programs.len(),
            });
        }
        self.active = id.0;
        Ok(())
    }

    pub fn active(&self) -> &P {
        &self.programs[self.active]
    }

    pub fn active_id(&self) -> SceneId {
        SceneId(self.active)
    }

    pub fn get(&self, id: SceneId) -> Option<&P> {
        self.programs.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Registers `programs` in order. Returns `None` when there are none.
    pub fn from_programs(programs: impl IntoIterator<Item = P>) -> Option<Self> {
        let mut programs = programs.into_iter();
        let mut registry = Self::new(programs.next()?);
        for program in programs {
            registry.register(program);
        }
        Some(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SceneId, &P)> {
        self.programs
            .iter()
            .enumerate()
            .map(|(index, program)| (SceneId(index), program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_of(names: &[&'static str]) -> SceneRegistry<&'static str> {
        SceneRegistry::from_programs(names.iter().copied()).expect("at least one scene")
    }

    #[test]
    fn register_hands_out_sequential_ids() {
        let mut registry = SceneRegistry::new("a");
        assert_eq!(registry.register("b"), SceneId::new(1));
        assert_eq!(registry.register("c"), SceneId::new(2));
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn first_registered_scene_is_active_by_default() {
        let registry = registry_of(&["a", "b", "c"]);
        assert_eq!(*registry.active(), "a");
        assert_eq!(registry.active_id(), SceneId::new(0));
    }

    #[test]
    fn select_switches_active_program() {
        let mut registry = registry_of(&["a", "b", "c"]);
        registry.select(SceneId::new(2)).unwrap();
        assert_eq!(*registry.active(), "c");
        registry.select(SceneId::new(1)).unwrap();
        assert_eq!(*registry.active(), "b");
    }

    #[test]
    fn select_rejects_unregistered_ids_and_keeps_selection() {
        let mut registry = registry_of(&["a", "b"]);
        registry.select(SceneId::new(1)).unwrap();
        let err = registry.select(SceneId::new(2)).unwrap_err();
        assert_eq!(
            err,
            SceneError::OutOfRange {
                id: SceneId::new(2),
                len: 2
            }
        );
        assert_eq!(*registry.active(), "b");
    }

    #[test]
    fn iter_pairs_ids_with_programs() {
        let registry = registry_of(&["a", "b"]);
        let pairs: Vec<_> = registry.iter().map(|(id, p)| (id.index(), *p)).collect();
        assert_eq!(pairs, vec![(0, "a"), (1, "b")]);
        assert_eq!(registry.get(SceneId::new(5)), None);
    }

    #[test]
    fn no_programs_yields_no_registry() {
        assert!(SceneRegistry::<u8>::from_programs(Vec::new()).is_none());
        let registry = SceneRegistry::from_programs([7u8, 8, 9]).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(*registry.active(), 7);
    }
}
