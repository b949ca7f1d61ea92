//! Wire-level MIDI event type with sample-accurate timing.
//!
//! This is the channel-voice message set the MIDI dispatcher (in
//! `sushi-midi-io`) translates into keyboard/parameter RT events, and that an
//! internal plugin emits when it generates MIDI (clock, program changes from
//! a sequencer-like processor).

use midi_msg::{Channel, ChannelVoiceMsg};

/// A single channel-voice MIDI message with a sample-accurate frame offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Sample offset within the current chunk (0 = first sample).
    pub frame_offset: usize,
    /// MIDI channel (0-15).
    pub channel: Channel,
    pub msg: ChannelVoiceMsg,
}

impl MidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, channel: Channel, msg: ChannelVoiceMsg) -> Self {
        Self {
            frame_offset,
            channel,
            msg,
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOff { note, velocity },
        }
    }

    #[inline]
    pub fn control_change(frame_offset: usize, channel: u8, cc: u8, value: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control: cc, value },
            },
        }
    }

    #[inline]
    pub fn pitch_bend(frame_offset: usize, channel: u8, bend: u16) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::PitchBend { bend },
        }
    }

    #[inline]
    pub fn channel_pressure(frame_offset: usize, channel: u8, pressure: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ChannelPressure { pressure },
        }
    }

    #[inline]
    pub fn poly_pressure(frame_offset: usize, channel: u8, note: u8, pressure: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::PolyPressure { note, pressure },
        }
    }

    #[inline]
    pub fn program_change(frame_offset: usize, channel: u8, program: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::ProgramChange { program },
        }
    }

    #[inline]
    pub fn channel_num(&self) -> u8 {
        self.channel as u8
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.msg, ChannelVoiceMsg::NoteOn { velocity, .. } if velocity > 0)
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self.msg,
            ChannelVoiceMsg::NoteOff { .. } | ChannelVoiceMsg::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { note, .. }
            | ChannelVoiceMsg::NoteOff { note, .. }
            | ChannelVoiceMsg::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity, .. } | ChannelVoiceMsg::NoteOff { velocity, .. } => {
                Some(velocity)
            }
            _ => None,
        }
    }

    /// Velocity normalized to 0.0-1.0, for CV/gate translation.
    #[inline]
    pub fn velocity_normalized(&self) -> Option<f32> {
        self.velocity().map(|v| v as f32 / 127.0)
    }

    #[inline]
    pub fn control_number(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control, .. },
            } => Some(control),
            _ => None,
        }
    }

    #[inline]
    pub fn control_value(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { value, .. },
            } => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn program(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::ProgramChange { program } => Some(program),
            _ => None,
        }
    }

    /// Encode as a raw MIDI message, for forwarding to an outgoing port or
    /// embedding in a wrapped RT event.
    pub fn to_bytes(&self) -> RawMidiEvent {
        let channel = self.channel_num() & 0x0F;
        match self.msg {
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                RawMidiEvent::new([0x80 | channel, note, velocity], 3)
            }
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                RawMidiEvent::new([0x90 | channel, note, velocity], 3)
            }
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                RawMidiEvent::new([0xA0 | channel, note, pressure], 3)
            }
            ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC { control, value },
            } => RawMidiEvent::new([0xB0 | channel, control, value], 3),
            ChannelVoiceMsg::ControlChange { .. } => RawMidiEvent::new([0xB0 | channel, 0, 0], 3),
            ChannelVoiceMsg::ProgramChange { program } => {
                RawMidiEvent::new([0xC0 | channel, program, 0], 2)
            }
            ChannelVoiceMsg::ChannelPressure { pressure } => {
                RawMidiEvent::new([0xD0 | channel, pressure, 0], 2)
            }
            ChannelVoiceMsg::PitchBend { bend } => RawMidiEvent::new(
                [0xE0 | channel, (bend & 0x7F) as u8, ((bend >> 7) & 0x7F) as u8],
                3,
            ),
            _ => RawMidiEvent::new([0, 0, 0], 0),
        }
    }

    pub fn from_bytes(frame_offset: usize, raw: &RawMidiEvent) -> Option<Self> {
        let bytes = raw.as_slice();
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let kind = status & 0xF0;
        let msg = match kind {
            0x80 => ChannelVoiceMsg::NoteOff {
                note: *bytes.get(1)?,
                velocity: *bytes.get(2)?,
            },
            0x90 => ChannelVoiceMsg::NoteOn {
                note: *bytes.get(1)?,
                velocity: *bytes.get(2)?,
            },
            0xA0 => ChannelVoiceMsg::PolyPressure {
                note: *bytes.get(1)?,
                pressure: *bytes.get(2)?,
            },
            0xB0 => ChannelVoiceMsg::ControlChange {
                control: midi_msg::ControlChange::CC {
                    control: *bytes.get(1)?,
                    value: *bytes.get(2)?,
                },
            },
            0xC0 => ChannelVoiceMsg::ProgramChange {
                program: *bytes.get(1)?,
            },
            0xD0 => ChannelVoiceMsg::ChannelPressure {
                pressure: *bytes.get(1)?,
            },
            0xE0 => {
                let lsb = *bytes.get(1)? as u16;
                let msb = *bytes.get(2)? as u16;
                ChannelVoiceMsg::PitchBend {
                    bend: lsb | (msb << 7),
                }
            }
            _ => return None,
        };
        Some(Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg,
        })
    }
}

/// Raw wire-encoded MIDI message (up to 3 bytes), used when forwarding
/// events through an outgoing port or wrapping them in an RT event payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawMidiEvent {
    data: [u8; 3],
    len: u8,
}

impl RawMidiEvent {
    pub fn new(data: [u8; 3], len: u8) -> Self {
        debug_assert!(len as usize <= data.len());
        Self { data, len }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_and_off() {
        let on = MidiEvent::note_on(100, 0, 60, 100);
        assert!(on.is_note_on());
        assert_eq!(on.note(), Some(60));
        assert_eq!(on.velocity(), Some(100));
        assert_eq!(on.frame_offset, 100);

        let off = MidiEvent::note_off(0, 3, 64, 0);
        assert!(off.is_note_off());
        assert_eq!(off.channel_num(), 3);
    }

    #[test]
    fn note_on_zero_velocity_is_note_off() {
        let event = MidiEvent::note_on(0, 0, 60, 0);
        assert!(event.is_note_off());
        assert!(!event.is_note_on());
    }

    #[test]
    fn control_change_roundtrip() {
        let cc = MidiEvent::control_change(0, 5, 7, 127);
        assert_eq!(cc.control_number(), Some(7));
        assert_eq!(cc.control_value(), Some(127));
        assert_eq!(cc.channel_num(), 5);
    }

    #[test]
    fn velocity_normalized() {
        let event = MidiEvent::note_on(0, 0, 60, 127);
        assert!((event.velocity_normalized().unwrap() - 1.0).abs() < 0.01);
    }

    #[test]
    fn program_change() {
        let event = MidiEvent::program_change(0, 2, 5);
        assert_eq!(event.program(), Some(5));
    }
}
