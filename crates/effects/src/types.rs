use std::fmt;

/// Identity of the actor that owns an effect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Type descriptor of an effect. Used as the collision-pair key and for
/// per-owner/per-kind queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectKind(pub &'static str);

impl EffectKind {
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    next: u64,
}

impl InstanceIdAllocator {
    pub fn allocate(&mut self) -> InstanceId {
        let id = InstanceId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Outcome of a single update step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Continue,
    Remove,
}

impl UpdateResult {
    pub fn is_remove(self) -> bool {
        matches!(self, Self::Remove)
    }
}
