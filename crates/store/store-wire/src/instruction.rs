//! The tagged union of instructions and replies the owner's request/reply
//! endpoint understands (§6). The wire framing itself — length-delimited
//! protocol-buffer messages over an external message-queue transport —
//! is peripheral collaborator code outside this crate's scope; what
//! lives here is the instruction set and the dispatch against the core
//! engine, which a real transport adapter would sit in front of.

/// One request carried over the wire, tagged with the caller's sequence
/// number so the reply can be correlated back to it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Terminate { seq: u64 },
    WriteString { seq: u64, key: String, value: String },
    WriteStruct { seq: u64, key: String, v1: f64, v2: f64, v3: f64 },
    ExistsString { seq: u64, key: String },
    ExistsStruct { seq: u64, key: String },
    ReadString { seq: u64, key: String },
    ReadStruct { seq: u64, key: String },
    RemoveString { seq: u64, key: String },
    RemoveStruct { seq: u64, key: String },
    ProcessReadMetadata { seq: u64, from: u64, to: u64 },
    ProcessWriteMetadata { seq: u64, max_attempts: usize },
    CollectGarbage1 { seq: u64, max_attempts: usize },
    CollectGarbage2 { seq: u64, from: String, max_attempts: usize },
    GetReaderTokenId { seq: u64 },
    GetGlobalOldestRevisionRead { seq: u64 },
    AppendLogEntry { seq: u64, v1: f64, v2: f64, v3: f64 },
}

impl Instruction {
    pub fn seq(&self) -> u64 {
        match self {
            Instruction::Terminate { seq }
            | Instruction::WriteString { seq, .. }
            | Instruction::WriteStruct { seq, .. }
            | Instruction::ExistsString { seq, .. }
            | Instruction::ExistsStruct { seq, .. }
            | Instruction::ReadString { seq, .. }
            | Instruction::ReadStruct { seq, .. }
            | Instruction::RemoveString { seq, .. }
            | Instruction::RemoveStruct { seq, .. }
            | Instruction::ProcessReadMetadata { seq, .. }
            | Instruction::ProcessWriteMetadata { seq, .. }
            | Instruction::CollectGarbage1 { seq, .. }
            | Instruction::CollectGarbage2 { seq, .. }
            | Instruction::GetReaderTokenId { seq }
            | Instruction::GetGlobalOldestRevisionRead { seq }
            | Instruction::AppendLogEntry { seq, .. } => *seq,
        }
    }
}

/// The reply to one [`Instruction`], always carrying the same `seq`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Confirmation { seq: u64 },
    Predicate { seq: u64, value: bool },
    StringValue { seq: u64, value: Option<String> },
    StructValue { seq: u64, value: Option<(f64, f64, f64)> },
    Key { seq: u64, next_key: Option<String> },
    TokenId { seq: u64, id: u32 },
    Revision { seq: u64, revision: u64 },
    Index { seq: u64, index: Option<u64> },
    InvalidArgument { seq: u64, reason: String },
    MalformedMessage { seq: u64, reason: String },
}
