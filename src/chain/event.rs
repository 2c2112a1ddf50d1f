/// Voice and controller events a chain reacts to.
///
/// Voice allocation happens upstream; events address voice slots directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    NoteOn { voice: usize, note: u8, velocity: u8 },
    NoteOff { voice: usize },
    /// Retrigger without a full stop.
    Reset { voice: usize },
    Controller { number: u8, value: u8 },
    AllNotesOff,
}

pub trait EventReceiver {
    fn pop(&mut self) -> Option<ChainEvent>;
}

#[cfg(feature = "rtrb")]
impl EventReceiver for rtrb::Consumer<ChainEvent> {
    fn pop(&mut self) -> Option<ChainEvent> {
        rtrb::Consumer::pop(self).ok()
    }
}
