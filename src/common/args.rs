//! Argument lists for late-bound calls.
//!
//! `DISPPARAMS` wants its arguments back to front: `rgvarg[0]` is the last
//! argument of the call. `DispatchArgs` lets callers push arguments in the
//! order they would write them and keeps the storage in the order the
//! dispatch call reads it, so exporting is just handing out a slice.

use log::trace;
use thiserror::Error;

/// Slots are added in chunks of this size.
pub const GROW_BY: usize = 4;

/// Reserved named-argument id marking the first slot as the receiver.
pub const DISPID_THIS: i32 = -613;

static THIS_NAMED_ARGS: [i32; 1] = [DISPID_THIS];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("could not grow argument list to {requested} slots")]
    OutOfMemory { requested: usize },
    #[error("receiver must not be empty")]
    NullReceiver,
}

/// A value that can sit in an argument slot.
///
/// `Default` is the empty slot that fills unused capacity.
pub trait ArgSlot: Default {
    /// True when the slot holds nothing that could serve as a receiver.
    fn is_null(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    Absent,
    Present,
}

/// Growable, back-to-front argument list with an optional "this" receiver.
///
/// `data.len()` is the capacity. Populated slots live in
/// `data[current..]`, the receiver (if any) at `data[current]`.
#[derive(Debug)]
pub struct DispatchArgs<T: ArgSlot> {
    data: Vec<T>,
    current: usize,
    receiver: Receiver,
}

impl<T: ArgSlot> Default for DispatchArgs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ArgSlot> DispatchArgs<T> {
    pub fn new() -> Self {
        DispatchArgs {
            data: Vec::new(),
            current: 0,
            receiver: Receiver::Absent,
        }
    }

    /// Empty list with room for at least `capacity` arguments.
    pub fn with_capacity(capacity: usize) -> Result<Self, ArgsError> {
        let mut args = Self::new();
        args.reserve(capacity)?;
        Ok(args)
    }

    /// Number of populated slots, receiver included.
    pub fn len(&self) -> usize {
        self.data.len() - self.current
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn has_this(&self) -> bool {
        self.receiver == Receiver::Present
    }

    /// Appends one positional argument.
    ///
    /// With a receiver set, the receiver moves down one slot so it stays
    /// first in the exported array.
    pub fn add(&mut self, value: impl Into<T>) -> Result<(), ArgsError> {
        let value = value.into();
        self.reserve(self.len() + 1)?;

        match self.receiver {
            Receiver::Present => {
                let this = std::mem::take(&mut self.data[self.current]);
                self.data[self.current - 1] = this;
                self.data[self.current] = value;
            }
            Receiver::Absent => {
                self.data[self.current - 1] = value;
            }
        }
        self.current -= 1;
        Ok(())
    }

    /// Sets the implicit receiver, replacing the previous one in place.
    pub fn set_this(&mut self, receiver: impl Into<T>) -> Result<(), ArgsError> {
        let receiver = receiver.into();
        if receiver.is_null() {
            return Err(ArgsError::NullReceiver);
        }

        match self.receiver {
            Receiver::Present => {
                self.data[self.current] = receiver;
            }
            Receiver::Absent => {
                self.add(receiver)?;
                self.receiver = Receiver::Present;
            }
        }
        Ok(())
    }

    /// Releases every slot and forgets the receiver.
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.current = 0;
        self.receiver = Receiver::Absent;
    }

    pub fn view(&self) -> ArgsView<'_, T> {
        let named: &'static [i32] = match self.receiver {
            Receiver::Present => &THIS_NAMED_ARGS,
            Receiver::Absent => &[],
        };
        ArgsView {
            args: &self.data[self.current..],
            named,
        }
    }

    fn reserve(&mut self, required: usize) -> Result<(), ArgsError> {
        let capacity = self.data.len();
        if required <= capacity {
            return Ok(());
        }

        let count = self.len();
        let new_capacity = required
            .div_ceil(GROW_BY)
            .checked_mul(GROW_BY)
            .ok_or(ArgsError::OutOfMemory { requested: required })?;

        let mut data: Vec<T> = Vec::new();
        data.try_reserve_exact(new_capacity)
            .map_err(|_| ArgsError::OutOfMemory { requested: new_capacity })?;

        // Existing slots move to the top; the new room opens up below them.
        data.resize_with(new_capacity - capacity, T::default);
        data.append(&mut self.data);

        trace!("argument list grown from {} to {} slots", capacity, new_capacity);

        self.data = data;
        self.current = new_capacity - count;
        Ok(())
    }
}

/// Read-only export of a [`DispatchArgs`], laid out the way `DISPPARAMS`
/// expects it.
#[derive(Debug, Clone, Copy)]
pub struct ArgsView<'a, T> {
    args: &'a [T],
    named: &'static [i32],
}

impl<'a, T> ArgsView<'a, T> {
    /// All populated slots, receiver first, then arguments last to first.
    pub fn args(&self) -> &'a [T] {
        self.args
    }

    /// `[]`, or `[DISPID_THIS]` when the first slot is the receiver.
    pub fn named_args(&self) -> &'static [i32] {
        self.named
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn receiver(&self) -> Option<&'a T> {
        if self.named.is_empty() {
            None
        } else {
            self.args.first()
        }
    }

    /// Positional arguments in the order they were added.
    pub fn positional(&self) -> impl DoubleEndedIterator<Item = &'a T> + 'a {
        let skip = self.named.len();
        self.args[skip..].iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Slot(Option<u32>);

    impl ArgSlot for Slot {
        fn is_null(&self) -> bool {
            self.0.is_none()
        }
    }

    impl From<u32> for Slot {
        fn from(value: u32) -> Self {
            Slot(Some(value))
        }
    }

    /// Holds a strong count on a shared sentinel while populated.
    #[derive(Debug, Default)]
    struct Tracked(Option<Rc<()>>);

    impl ArgSlot for Tracked {
        fn is_null(&self) -> bool {
            self.0.is_none()
        }
    }

    fn positional(args: &DispatchArgs<Slot>) -> Vec<u32> {
        args.view().positional().map(|s| s.0.unwrap()).collect()
    }

    #[test]
    fn new_list_is_empty() {
        let args: DispatchArgs<Slot> = DispatchArgs::new();
        let view = args.view();
        assert!(view.is_empty());
        assert!(view.named_args().is_empty());
        assert!(view.receiver().is_none());
        assert_eq!(args.capacity(), 0);
    }

    #[test]
    fn add_keeps_call_order() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(1u32).unwrap();
        args.add(2u32).unwrap();
        args.add(3u32).unwrap();

        assert_eq!(positional(&args), vec![1, 2, 3]);
        assert_eq!(args.view().args(), &[Slot::from(3u32), Slot::from(2u32), Slot::from(1u32)]);
    }

    #[test]
    fn growing_past_first_chunk_preserves_order() {
        let mut args = DispatchArgs::<Slot>::new();
        for n in 10..16u32 {
            args.add(n).unwrap();
        }

        assert_eq!(args.len(), 6);
        assert_eq!(args.capacity(), 8);
        assert_eq!(positional(&args), (10..16u32).collect::<Vec<_>>());
    }

    #[test]
    fn capacity_grows_in_chunks() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(0u32).unwrap();
        assert_eq!(args.capacity(), 4);
        for n in 1..4u32 {
            args.add(n).unwrap();
        }
        assert_eq!(args.capacity(), 4);
        args.add(4u32).unwrap();
        assert_eq!(args.capacity(), 8);
    }

    #[test]
    fn with_capacity_rounds_up() {
        let args = DispatchArgs::<Slot>::with_capacity(5).unwrap();
        assert_eq!(args.capacity(), 8);
        assert!(args.is_empty());
    }

    #[test]
    fn with_capacity_overflow_is_an_error() {
        let err = DispatchArgs::<Slot>::with_capacity(usize::MAX - 1).unwrap_err();
        assert_eq!(err, ArgsError::OutOfMemory { requested: usize::MAX - 1 });
    }

    #[test]
    fn with_capacity_too_large_to_allocate() {
        let err = DispatchArgs::<Slot>::with_capacity(usize::MAX / 4).unwrap_err();
        assert!(matches!(err, ArgsError::OutOfMemory { .. }));
    }

    #[test]
    fn failed_growth_leaves_list_untouched() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(1u32).unwrap();
        args.set_this(9u32).unwrap();
        args.add(2u32).unwrap();

        assert!(matches!(
            args.reserve(usize::MAX / 4),
            Err(ArgsError::OutOfMemory { .. })
        ));
        assert!(matches!(
            args.reserve(usize::MAX),
            Err(ArgsError::OutOfMemory { .. })
        ));

        assert_eq!(args.len(), 3);
        assert_eq!(args.capacity(), 4);
        assert!(args.has_this());
        assert_eq!(args.view().receiver(), Some(&Slot::from(9u32)));
        assert_eq!(positional(&args), vec![1, 2]);

        args.add(3u32).unwrap();
        assert_eq!(positional(&args), vec![1, 2, 3]);
    }

    #[test]
    fn set_this_on_empty_list() {
        let mut args = DispatchArgs::<Slot>::new();
        args.set_this(7u32).unwrap();

        let view = args.view();
        assert_eq!(view.len(), 1);
        assert_eq!(view.named_args(), &[DISPID_THIS]);
        assert_eq!(view.receiver(), Some(&Slot::from(7u32)));
        assert_eq!(view.args()[0], Slot::from(7u32));
        assert_eq!(view.positional().count(), 0);
    }

    #[test]
    fn receiver_stays_first_after_add() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(1u32).unwrap();
        args.set_this(99u32).unwrap();
        args.add(2u32).unwrap();

        assert_eq!(positional(&args), vec![1, 2]);
        assert_eq!(args.view().receiver(), Some(&Slot::from(99u32)));
        assert_eq!(
            args.view().args(),
            &[Slot::from(99u32), Slot::from(2u32), Slot::from(1u32)]
        );

        args.set_this(100u32).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.view().receiver(), Some(&Slot::from(100u32)));
        assert_eq!(positional(&args), vec![1, 2]);
    }

    #[test]
    fn receiver_survives_growth() {
        let mut args = DispatchArgs::<Slot>::new();
        args.set_this(50u32).unwrap();
        for n in 0..6u32 {
            args.add(n).unwrap();
        }

        assert_eq!(args.len(), 7);
        assert_eq!(args.view().receiver(), Some(&Slot::from(50u32)));
        assert_eq!(positional(&args), (0..6u32).collect::<Vec<_>>());
    }

    #[test]
    fn null_receiver_is_rejected() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(1u32).unwrap();

        assert_eq!(args.set_this(Slot(None)), Err(ArgsError::NullReceiver));
        assert!(!args.has_this());
        assert_eq!(positional(&args), vec![1]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut args = DispatchArgs::<Slot>::new();
        args.add(1u32).unwrap();
        args.set_this(2u32).unwrap();
        args.clear();

        let view = args.view();
        assert_eq!(view.len(), 0);
        assert!(view.named_args().is_empty());
        assert!(!args.has_this());

        args.clear();
        assert!(args.is_empty());

        args.add(3u32).unwrap();
        assert_eq!(positional(&args), vec![3]);
    }

    #[test]
    fn clear_releases_each_slot_once() {
        let sentinel = Rc::new(());
        let mut args = DispatchArgs::<Tracked>::new();
        for _ in 0..5 {
            args.add(Tracked(Some(Rc::clone(&sentinel)))).unwrap();
        }
        args.set_this(Tracked(Some(Rc::clone(&sentinel)))).unwrap();
        assert_eq!(Rc::strong_count(&sentinel), 7);

        args.clear();
        assert_eq!(Rc::strong_count(&sentinel), 1);
    }

    #[test]
    fn overwritten_receiver_is_released() {
        let sentinel = Rc::new(());
        let mut args = DispatchArgs::<Tracked>::new();
        args.set_this(Tracked(Some(Rc::clone(&sentinel)))).unwrap();
        args.set_this(Tracked(Some(Rc::clone(&sentinel)))).unwrap();
        assert_eq!(Rc::strong_count(&sentinel), 2);
    }

    #[test]
    fn drop_releases_slots() {
        let sentinel = Rc::new(());
        {
            let mut args = DispatchArgs::<Tracked>::new();
            for _ in 0..9 {
                args.add(Tracked(Some(Rc::clone(&sentinel)))).unwrap();
            }
            assert_eq!(Rc::strong_count(&sentinel), 10);
        }
        assert_eq!(Rc::strong_count(&sentinel), 1);
    }
}
