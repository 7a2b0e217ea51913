use fswatcher_core::ChangeKind;
use notify::event::{
    AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind,
    RenameMode,
};
use notify::EventKind;

#[test]
fn test_content_writes_are_modifications() {
    for kind in [
        EventKind::Modify(ModifyKind::Data(DataChange::Content)),
        EventKind::Modify(ModifyKind::Data(DataChange::Any)),
        EventKind::Modify(ModifyKind::Any),
    ] {
        assert_eq!(
            ChangeKind::from_event_kind(&kind),
            Some(ChangeKind::Modified),
            "{kind:?}"
        );
    }
}

#[test]
fn test_removals() {
    for kind in [
        EventKind::Remove(RemoveKind::File),
        EventKind::Remove(RemoveKind::Any),
    ] {
        assert_eq!(ChangeKind::from_event_kind(&kind), Some(ChangeKind::Removed));
    }
}

#[test]
fn test_other_events_are_ignored() {
    for kind in [
        EventKind::Access(AccessKind::Close(AccessMode::Write)),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)),
        EventKind::Create(CreateKind::File),
        EventKind::Any,
        EventKind::Other,
    ] {
        assert_eq!(ChangeKind::from_event_kind(&kind), None, "{kind:?}");
    }
}
