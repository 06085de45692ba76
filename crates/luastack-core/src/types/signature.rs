//! Type-level description of native callables.
//!
//! A native function is classified by a marker type ([`Free`], [`Method`],
//! [`ConstMethod`], [`Contextual`]) and its parameter tuple. From those the
//! crate derives a [`Signature`] for diagnostics and a [`Frame`] that maps
//! each declared parameter to where its value lives at call time: captured
//! values in the closure's upvalues, the rest on the stack.

use crate::ffi;
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::ops::Range;

/// Shape of a native callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
    /// Plain function of its parameters.
    Free,
    /// Takes `&mut T` from call-time slot 1.
    Method,
    /// Takes `&T` from call-time slot 1.
    ConstMethod,
    /// Takes the calling [`Vm`](crate::core::state::Vm) before its parameters.
    Contextual,
}

impl CallableKind {
    pub fn has_receiver(self) -> bool {
        matches!(self, CallableKind::Method | CallableKind::ConstMethod)
    }
}

/// Compile-time tag selecting a [`CallableKind`].
pub trait Kind: 'static {
    const TAG: CallableKind;
}

pub struct Free;

pub struct Method<T>(PhantomData<fn(&mut T)>);

pub struct ConstMethod<T>(PhantomData<fn(&T)>);

pub struct Contextual;

impl Kind for Free {
    const TAG: CallableKind = CallableKind::Free;
}

impl<T: 'static> Kind for Method<T> {
    const TAG: CallableKind = CallableKind::Method;
}

impl<T: 'static> Kind for ConstMethod<T> {
    const TAG: CallableKind = CallableKind::ConstMethod;
}

impl Kind for Contextual {
    const TAG: CallableKind = CallableKind::Contextual;
}

/// Decomposed signature of a native callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: CallableKind,
    /// Receiver type for methods.
    pub owner: Option<&'static str>,
    pub output: &'static str,
    pub params: Vec<&'static str>,
}

impl Signature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Positions of every declared parameter.
    pub fn indices(&self) -> IndexSeq {
        IndexSeq::new(self.arity())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.owner) {
            (CallableKind::Method, Some(owner)) => write!(f, "fn(&mut {owner}")?,
            (CallableKind::ConstMethod, Some(owner)) => write!(f, "fn(&{owner}")?,
            (CallableKind::Contextual, _) => write!(f, "fn(&Vm")?,
            _ => write!(f, "fn(")?,
        }
        let mut leading = self.kind != CallableKind::Free;
        for param in &self.params {
            if leading {
                f.write_str(", ")?;
            }
            f.write_str(param)?;
            leading = true;
        }
        write!(f, ") -> {}", self.output)
    }
}

/// A contiguous run of zero-based parameter positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSeq {
    start: usize,
    len: usize,
}

impl IndexSeq {
    /// `0..len`.
    pub fn new(len: usize) -> Self {
        IndexSeq { start: 0, len }
    }

    /// `start..start + len`.
    pub fn range(start: usize, len: usize) -> Self {
        IndexSeq { start, len }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Sub-sequence of `count` positions starting `from` positions in.
    /// Clamped to this sequence.
    pub fn sub(&self, from: usize, count: usize) -> Self {
        let from = from.min(self.len);
        let count = count.min(self.len - from);
        IndexSeq::range(self.start + from, count)
    }

    /// Splits into the first `at` positions and the rest.
    pub fn split(&self, at: usize) -> (Self, Self) {
        let head = self.sub(0, at);
        (head, self.sub(head.len, self.len - head.len))
    }

    pub fn contains(&self, position: usize) -> bool {
        self.as_range().contains(&position)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn iter(&self) -> Range<usize> {
        self.as_range()
    }
}

impl IntoIterator for IndexSeq {
    type Item = usize;
    type IntoIter = Range<usize>;

    fn into_iter(self) -> Range<usize> {
        self.as_range()
    }
}

/// Upvalue 1 of every exposed function holds the boxed callback; captured
/// values follow it.
pub(crate) const FIRST_CAPTURE_UPVALUE: c_int = 2;

/// Where each declared parameter of one dispatch is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    captured: IndexSeq,
    supplied: IndexSeq,
    first_argument: c_int,
}

impl Frame {
    pub fn new(arity: usize, captured: usize, has_receiver: bool) -> Self {
        let (captured, supplied) = IndexSeq::new(arity).split(captured);
        Frame {
            captured,
            supplied,
            first_argument: if has_receiver { 2 } else { 1 },
        }
    }

    pub fn captured(&self) -> IndexSeq {
        self.captured
    }

    pub fn supplied(&self) -> IndexSeq {
        self.supplied
    }

    /// Stack slot holding the receiver of a method call.
    pub fn receiver(&self) -> c_int {
        1
    }

    /// Pseudo-index or stack index of declared parameter `position`.
    pub fn slot(&self, position: usize) -> c_int {
        if self.captured.contains(position) {
            ffi::lua_upvalueindex(FIRST_CAPTURE_UPVALUE + position as c_int)
        } else {
            self.first_argument + (position - self.supplied.start()) as c_int
        }
    }

    /// Position reported to scripts in `bad argument #n` messages: the Lua
    /// argument number for supplied parameters, the declared one for
    /// captured ones.
    pub fn argument_number(&self, position: usize) -> usize {
        if self.captured.contains(position) {
            position + 1
        } else {
            self.slot(position) as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_captured_from_supplied() {
        let (captured, supplied) = IndexSeq::new(5).split(2);
        assert_eq!(captured.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(supplied.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(supplied.contains(4));
        assert!(!supplied.contains(5));
    }

    #[test]
    fn split_past_the_end_clamps() {
        let (captured, supplied) = IndexSeq::new(2).split(4);
        assert_eq!(captured.len(), 2);
        assert!(supplied.is_empty());
        assert_eq!(supplied.start(), 2);
    }

    #[test]
    fn sub_sequences_are_offset() {
        let seq = IndexSeq::range(3, 4);
        assert_eq!(seq.sub(1, 2).as_range(), 4..6);
        assert_eq!(seq.sub(3, 10).as_range(), 6..7);
        assert_eq!(seq.into_iter().count(), 4);
    }

    #[test]
    fn free_frame_reads_upvalues_then_stack() {
        let frame = Frame::new(3, 1, false);
        assert_eq!(frame.slot(0), ffi::lua_upvalueindex(2));
        assert_eq!(frame.slot(1), 1);
        assert_eq!(frame.slot(2), 2);
        assert_eq!(frame.argument_number(0), 1);
        assert_eq!(frame.argument_number(2), 2);
    }

    #[test]
    fn method_frame_skips_receiver() {
        let frame = Frame::new(2, 0, true);
        assert_eq!(frame.receiver(), 1);
        assert_eq!(frame.slot(0), 2);
        assert_eq!(frame.slot(1), 3);
        assert_eq!(frame.argument_number(0), 2);
    }

    #[test]
    fn signature_display() {
        let signature = Signature {
            kind: CallableKind::Method,
            owner: Some("Counter"),
            output: "i64",
            params: vec!["i64", "bool"],
        };
        assert_eq!(signature.to_string(), "fn(&mut Counter, i64, bool) -> i64");
        assert_eq!(signature.indices().len(), 2);

        let free = Signature {
            kind: CallableKind::Free,
            owner: None,
            output: "()",
            params: vec![],
        };
        assert_eq!(free.to_string(), "fn() -> ()");
        assert!(CallableKind::ConstMethod.has_receiver());
        assert!(!CallableKind::Contextual.has_receiver());
    }
}
