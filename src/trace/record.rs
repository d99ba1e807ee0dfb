use crate::Arbitrary;
use crate::BlockNumber;
use crate::ElementId;
use byteorder::LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::io::Read;
use std::io::Write;

/// the kinds of events the instrumented target reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TraceKind {
    TrueBranch = 0,
    FalseBranch = 1,
    EnterFunction = 2,
    ExitFunction = 3,
    ExceptionBranch = 4,
    Kill = 5,
    Terminated = 6,
    Crashed = 7,
    TimedOut = 8,
}

impl TraceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrueBranch => "true_branch",
            Self::FalseBranch => "false_branch",
            Self::EnterFunction => "enter_function",
            Self::ExitFunction => "exit_function",
            Self::ExceptionBranch => "exception_branch",
            Self::Kill => "kill",
            Self::Terminated => "terminated",
            Self::Crashed => "crashed",
            Self::TimedOut => "timed_out",
        }
    }

    /// a trace is complete once its last record is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Crashed | Self::TimedOut)
    }
}

impl Default for TraceKind {
    fn default() -> Self {
        Self::Terminated
    }
}

impl TryFrom<u8> for TraceKind {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::TrueBranch),
            1 => Ok(Self::FalseBranch),
            2 => Ok(Self::EnterFunction),
            3 => Ok(Self::ExitFunction),
            4 => Ok(Self::ExceptionBranch),
            5 => Ok(Self::Kill),
            6 => Ok(Self::Terminated),
            7 => Ok(Self::Crashed),
            8 => Ok(Self::TimedOut),
            x => Err(x),
        }
    }
}

/// one program point reported by the target runtime. block numbers are the
/// CFG-internal ones; resolution to element ids happens on the fuzzer side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub kind: TraceKind,
    pub thread: u64,
    pub function: ElementId,
    pub pred: BlockNumber,
    pub cur: BlockNumber,
}

// constructors for the runtime call sites
impl TraceRecord {
    pub const BYTES: usize = 21;

    pub fn reach(thread: u64, function: ElementId, pred: BlockNumber, cur: BlockNumber) -> Self {
        Self {
            kind: TraceKind::TrueBranch,
            thread,
            function,
            pred,
            cur,
        }
    }

    pub fn skip(thread: u64, function: ElementId, pred: BlockNumber, cur: BlockNumber) -> Self {
        Self {
            kind: TraceKind::FalseBranch,
            thread,
            function,
            pred,
            cur,
        }
    }

    pub fn boundary(kind: TraceKind, thread: u64, function: ElementId) -> Self {
        Self {
            kind,
            thread,
            function,
            pred: 0,
            cur: 0,
        }
    }

    pub fn marker(kind: TraceKind) -> Self {
        Self {
            kind,
            thread: 0,
            function: 0,
            pred: 0,
            cur: 0,
        }
    }
}

// wire codec: kind:1 thread:8 func:4 pred:4 cur:4
impl TraceRecord {
    pub fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u8(self.kind as u8)?;
        w.write_u64::<LE>(self.thread)?;
        w.write_u32::<LE>(self.function)?;
        w.write_u32::<LE>(self.pred)?;
        w.write_u32::<LE>(self.cur)
    }

    pub fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let kind = TraceKind::try_from(r.read_u8()?)
            .map_err(|x| std::io::Error::other(format!("unknown trace kind {}", x)))?;
        Ok(Self {
            kind,
            thread: r.read_u64::<LE>()?,
            function: r.read_u32::<LE>()?,
            pred: r.read_u32::<LE>()?,
            cur: r.read_u32::<LE>()?,
        })
    }
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} thread={} func={}", self.kind.name(), self.thread, self.function)?;
        if self.cur > 0 {
            write!(f, " {}->{}", self.pred, self.cur)?;
        }
        write!(f, ">")
    }
}

impl Arbitrary for TraceRecord {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self {
            kind: TraceKind::try_from(rng.random_range(0u8..=8)).unwrap(),
            thread: rng.random(),
            function: rng.random_range(1..64),
            pred: rng.random_range(0..16),
            cur: rng.random_range(0..16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trips() {
        for _ in 0..64 {
            let record = TraceRecord::random();
            let mut bytes = Vec::new();
            record.encode(&mut bytes).unwrap();
            assert_eq!(bytes.len(), TraceRecord::BYTES);
            let decoded = TraceRecord::decode(&mut bytes.as_slice()).unwrap();
            assert_eq!(record, decoded);
        }
    }

    #[test]
    fn record_fits_the_wire_budget() {
        assert!(TraceRecord::BYTES <= 22);
    }

    #[test]
    fn only_end_states_are_terminal() {
        assert!(TraceKind::Terminated.is_terminal());
        assert!(TraceKind::Crashed.is_terminal());
        assert!(TraceKind::TimedOut.is_terminal());
        assert!(!TraceKind::TrueBranch.is_terminal());
        assert!(!TraceKind::EnterFunction.is_terminal());
        assert!(!TraceKind::Kill.is_terminal());
    }

    #[test]
    fn bad_kind_byte_is_rejected() {
        let mut bytes = vec![0xffu8; TraceRecord::BYTES];
        assert!(TraceRecord::decode(&mut bytes.as_slice()).is_err());
    }
}
