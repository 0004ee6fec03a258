//! Dispatches [`Instruction`]s against a live [`MvccStore`] and its
//! append-only log, producing the matching [`Reply`].
//!
//! A real deployment sits a length-delimited protocol-buffer codec and a
//! message-queue transport in front of this type; neither exists here —
//! per the instruction set this crate covers (§6), the wire framing
//! itself is a collaborator's concern, not this store's.

use store_core::{Key, MvccStore, StoreString, StoreTriple};
use store_log::LogOwnerHandle;
use store_region::{make_tag, Version, TAG_LEN};
use tracing::trace;

use crate::instruction::{Instruction, Reply};

/// Version stamped into every log region this crate creates.
pub const LOG_VERSION: Version = Version::new(1, 0, 0, 0);
const LOG_TAG: [u8; TAG_LEN] = make_tag(b"MVCCLOG");

/// Owns the store and the log the instruction set is dispatched against.
/// One dispatcher per owning process: both `owner()` calls and log
/// appends assume single-writer discipline, the same way the store
/// itself does.
pub struct Dispatcher {
    store: MvccStore,
    log: LogOwnerHandle<StoreTriple>,
}

impl Dispatcher {
    pub fn new(store: MvccStore, log: LogOwnerHandle<StoreTriple>) -> Self {
        Self { store, log }
    }

    fn key(seq: u64, raw: &str) -> Result<Key, Reply> {
        Key::new(raw).map_err(|e| Reply::InvalidArgument { seq, reason: e.to_string() })
    }

    /// Dispatches one instruction, returning the reply it produces.
    /// Never panics on malformed input — an oversized key or value
    /// becomes an `InvalidArgument` reply, not a crash.
    pub fn dispatch(&mut self, instruction: Instruction) -> Reply {
        let seq = instruction.seq();
        trace!(seq, instruction = ?instruction, "dispatching instruction");
        match instruction {
            Instruction::Terminate { seq } => Reply::Confirmation { seq },

            Instruction::WriteString { seq, key, value } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                let value = match StoreString::new(&value) {
                    Ok(v) => v,
                    Err(e) => return Reply::InvalidArgument { seq, reason: e.to_string() },
                };
                match self.store.writer() {
                    Ok(writer) => match writer.write(&key, value) {
                        Ok(_) => Reply::Confirmation { seq },
                        Err(e) => Reply::MalformedMessage { seq, reason: e.to_string() },
                    },
                    Err(_) => Reply::MalformedMessage { seq, reason: "writer busy".to_string() },
                }
            }

            Instruction::WriteStruct { seq, key, v1, v2, v3 } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                match self.store.writer() {
                    Ok(writer) => match writer.write(&key, StoreTriple { v1, v2, v3 }) {
                        Ok(_) => Reply::Confirmation { seq },
                        Err(e) => Reply::MalformedMessage { seq, reason: e.to_string() },
                    },
                    Err(_) => Reply::MalformedMessage { seq, reason: "writer busy".to_string() },
                }
            }

            Instruction::ExistsString { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                let value = self.store.exists::<StoreString>(&key).unwrap_or(false);
                Reply::Predicate { seq, value }
            }

            Instruction::ExistsStruct { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                let value = self.store.exists::<StoreTriple>(&key).unwrap_or(false);
                Reply::Predicate { seq, value }
            }

            Instruction::ReadString { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                let value = self
                    .store
                    .reader()
                    .ok()
                    .and_then(|r| r.read::<StoreString>(&key))
                    .map(|s| s.as_str().to_string());
                Reply::StringValue { seq, value }
            }

            Instruction::ReadStruct { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                let value = self
                    .store
                    .reader()
                    .ok()
                    .and_then(|r| r.read::<StoreTriple>(&key))
                    .map(|t| (t.v1, t.v2, t.v3));
                Reply::StructValue { seq, value }
            }

            Instruction::RemoveString { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                match self.store.writer() {
                    Ok(writer) => match writer.remove::<StoreString>(&key) {
                        Ok(()) => Reply::Confirmation { seq },
                        Err(e) => Reply::MalformedMessage { seq, reason: e.to_string() },
                    },
                    Err(_) => Reply::MalformedMessage { seq, reason: "writer busy".to_string() },
                }
            }

            Instruction::RemoveStruct { seq, key } => {
                let key = match Self::key(seq, &key) {
                    Ok(k) => k,
                    Err(reply) => return reply,
                };
                match self.store.writer() {
                    Ok(writer) => match writer.remove::<StoreTriple>(&key) {
                        Ok(()) => Reply::Confirmation { seq },
                        Err(e) => Reply::MalformedMessage { seq, reason: e.to_string() },
                    },
                    Err(_) => Reply::MalformedMessage { seq, reason: "writer busy".to_string() },
                }
            }

            Instruction::ProcessReadMetadata { seq, from, to } => {
                self.store.owner().process_read_metadata(from, to);
                Reply::Confirmation { seq }
            }

            Instruction::ProcessWriteMetadata { seq, max_attempts } => {
                match self.store.owner().process_write_metadata(max_attempts) {
                    Ok(()) => Reply::Confirmation { seq },
                    Err(e) => Reply::MalformedMessage { seq, reason: e.to_string() },
                }
            }

            Instruction::CollectGarbage1 { seq, max_attempts } => {
                let next_key = self.store.collect_garbage(max_attempts).map(|k| k.to_string());
                Reply::Key { seq, next_key }
            }

            // The store's garbage collector resumes from wherever the
            // previous round's cursor left off rather than an
            // arbitrary caller-supplied key; `from` is accepted for
            // wire-compatibility with the instruction table but has no
            // effect beyond that.
            Instruction::CollectGarbage2 { seq, from: _, max_attempts } => {
                let next_key = self.store.collect_garbage(max_attempts).map(|k| k.to_string());
                Reply::Key { seq, next_key }
            }

            Instruction::GetReaderTokenId { seq } => match self.store.reader() {
                Ok(reader) => Reply::TokenId { seq, id: reader.id() },
                Err(_) => Reply::MalformedMessage { seq, reason: "reader limit reached".to_string() },
            },

            Instruction::GetGlobalOldestRevisionRead { seq } => {
                Reply::Revision { seq, revision: self.store.oldest_reader_revision() }
            }

            Instruction::AppendLogEntry { seq, v1, v2, v3 } => {
                Reply::Index { seq, index: self.log.append(StoreTriple { v1, v2, v3 }) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_region::Version as RegionVersion;

    fn make_dispatcher(dir: &std::path::Path) -> Dispatcher {
        let store = MvccStore::open_or_create_file(dir.join("store.bin"), 1 << 20).unwrap();
        let log = LogOwnerHandle::open_or_create_file(
            dir.join("log.bin"),
            4096,
            make_tag(b"MVCCLOG"),
            RegionVersion::new(1, 0, 0, 0),
        )
        .unwrap();
        Dispatcher::new(store, log)
    }

    #[test]
    fn write_then_read_struct_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        let write = dispatcher.dispatch(Instruction::WriteStruct {
            seq: 1,
            key: "temperature".to_string(),
            v1: 21.5,
            v2: 0.0,
            v3: 0.0,
        });
        assert_eq!(write, Reply::Confirmation { seq: 1 });

        let read = dispatcher.dispatch(Instruction::ReadStruct { seq: 2, key: "temperature".to_string() });
        assert_eq!(read, Reply::StructValue { seq: 2, value: Some((21.5, 0.0, 0.0)) });
    }

    #[test]
    fn write_then_read_string_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        dispatcher.dispatch(Instruction::WriteString {
            seq: 1,
            key: "name".to_string(),
            value: "hello".to_string(),
        });
        let read = dispatcher.dispatch(Instruction::ReadString { seq: 2, key: "name".to_string() });
        assert_eq!(read, Reply::StringValue { seq: 2, value: Some("hello".to_string()) });
    }

    #[test]
    fn reading_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        let read = dispatcher.dispatch(Instruction::ReadStruct { seq: 1, key: "missing".to_string() });
        assert_eq!(read, Reply::StructValue { seq: 1, value: None });
    }

    #[test]
    fn oversized_key_is_invalid_argument_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        let too_long = "a".repeat(64);
        let reply = dispatcher.dispatch(Instruction::ExistsStruct { seq: 1, key: too_long });
        assert!(matches!(reply, Reply::InvalidArgument { seq: 1, .. }));
    }

    #[test]
    fn remove_then_exists_reports_false_after_gc() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        dispatcher.dispatch(Instruction::WriteStruct {
            seq: 1,
            key: "alpha".to_string(),
            v1: 1.0,
            v2: 0.0,
            v3: 0.0,
        });
        dispatcher.dispatch(Instruction::RemoveStruct { seq: 2, key: "alpha".to_string() });
        dispatcher.dispatch(Instruction::ProcessWriteMetadata { seq: 3, max_attempts: 8 });
        let gc = dispatcher.dispatch(Instruction::CollectGarbage1 { seq: 4, max_attempts: 8 });
        assert!(matches!(gc, Reply::Key { seq: 4, .. }));
        let exists = dispatcher.dispatch(Instruction::ExistsStruct { seq: 5, key: "alpha".to_string() });
        assert_eq!(exists, Reply::Predicate { seq: 5, value: false });
    }

    #[test]
    fn collect_garbage_reports_resume_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        dispatcher.dispatch(Instruction::WriteStruct { seq: 1, key: "alpha".to_string(), v1: 0.0, v2: 0.0, v3: 0.0 });
        dispatcher.dispatch(Instruction::RemoveStruct { seq: 2, key: "alpha".to_string() });
        dispatcher.dispatch(Instruction::ProcessWriteMetadata { seq: 3, max_attempts: 8 });

        let gc = dispatcher.dispatch(Instruction::CollectGarbage1 { seq: 4, max_attempts: 8 });
        assert_eq!(gc, Reply::Key { seq: 4, next_key: Some("alpha".to_string()) });

        // A single-entry registry always wraps back to the same key.
        let gc_again = dispatcher.dispatch(Instruction::CollectGarbage2 { seq: 5, from: "alpha".to_string(), max_attempts: 8 });
        assert_eq!(gc_again, Reply::Key { seq: 5, next_key: Some("alpha".to_string()) });
    }

    #[test]
    fn append_log_entry_returns_increasing_indices() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = make_dispatcher(dir.path());
        let first = dispatcher.dispatch(Instruction::AppendLogEntry { seq: 1, v1: 1.0, v2: 0.0, v3: 0.0 });
        let second = dispatcher.dispatch(Instruction::AppendLogEntry { seq: 2, v1: 2.0, v2: 0.0, v3: 0.0 });
        assert_eq!(first, Reply::Index { seq: 1, index: Some(0) });
        assert_eq!(second, Reply::Index { seq: 2, index: Some(1) });
    }
}
