//! Leak diagnostics.
use std::fmt;
use std::panic::Location;

/// Notification channels of a `ChangeDispatcher`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Value,
    Children,
    PropertyName,
    ObjectLifecycle,
    LinkLifecycle,
    LinkLifecycleForEnd,
    LinkLifecycleForStart,
    LinkValidity,
    ErrorChanged,
    ErrorChangedInScene,
    PreviewDirty,
    UndoChanged,
    ExternalProjectChanged,
    ExternalProjectMapChanged,
    RootOrderChanged,
    AfterDispatch,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 16] = [
        ChannelKind::Value,
        ChannelKind::Children,
        ChannelKind::PropertyName,
        ChannelKind::ObjectLifecycle,
        ChannelKind::LinkLifecycle,
        ChannelKind::LinkLifecycleForEnd,
        ChannelKind::LinkLifecycleForStart,
        ChannelKind::LinkValidity,
        ChannelKind::ErrorChanged,
        ChannelKind::ErrorChangedInScene,
        ChannelKind::PreviewDirty,
        ChannelKind::UndoChanged,
        ChannelKind::ExternalProjectChanged,
        ChannelKind::ExternalProjectMapChanged,
        ChannelKind::RootOrderChanged,
        ChannelKind::AfterDispatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Value => "value",
            ChannelKind::Children => "children",
            ChannelKind::PropertyName => "property name",
            ChannelKind::ObjectLifecycle => "object lifecycle",
            ChannelKind::LinkLifecycle => "link lifecycle",
            ChannelKind::LinkLifecycleForEnd => "link lifecycle (end object)",
            ChannelKind::LinkLifecycleForStart => "link lifecycle (start object)",
            ChannelKind::LinkValidity => "link validity",
            ChannelKind::ErrorChanged => "error changed",
            ChannelKind::ErrorChangedInScene => "error changed in scene",
            ChannelKind::PreviewDirty => "preview dirty",
            ChannelKind::UndoChanged => "undo changed",
            ChannelKind::ExternalProjectChanged => "external project changed",
            ChannelKind::ExternalProjectMapChanged => "external project map changed",
            ChannelKind::RootOrderChanged => "root order changed",
            ChannelKind::AfterDispatch => "after dispatch",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A listener that is still registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LeakedListener {
    pub channel: ChannelKind,
    /// Where the listener was registered.
    pub location: &'static Location<'static>,
}

/// Listeners still registered on a dispatcher, ordered by channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
    pub leaks: Vec<LeakedListener>,
}

impl LeakReport {
    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    /// Number of leaked listeners on the specified channel.
    pub fn count(&self, channel: ChannelKind) -> usize {
        self.leaks.iter().filter(|leak| leak.channel == channel).count()
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} listener(s)", self.leaks.len())?;
        for leak in self.leaks.iter() {
            write!(f, "\n  {} listener registered at {}", leak.channel, leak.location)?;
        }
        Ok(())
    }
}
