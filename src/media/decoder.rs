//! Decoder session: the send/receive protocol as an explicit state machine
//!
//! One packet may yield zero, one or many frames. After every accepted packet
//! the session is in `DrainingFrames` and only returns to `AwaitingPacket`
//! once the decoder reports that it would block. Sending a packet while
//! frames are still pending is rejected.

use crate::error::PlaybackError;

use super::{ReceiveOutcome, VideoDecoder};

/// Where the session is in the send/receive cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Decoder is drained and ready for the next packet
    AwaitingPacket,
    /// A packet was accepted; frames must be received until it would block
    DrainingFrames,
    /// End of input was signalled; remaining buffered frames are being drained
    Flushing,
    /// Decoder reported end of stream
    Finished,
}

/// Owns a decoder and enforces the drain-after-send rule
pub struct DecoderSession<D: VideoDecoder> {
    decoder: D,
    state: DecodeState,
    frames_received: u64,
}

impl<D: VideoDecoder> DecoderSession<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            state: DecodeState::AwaitingPacket,
            frames_received: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Frames received so far
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Feed one packet. Only valid in `AwaitingPacket`.
    pub fn send_packet(&mut self, packet: &D::Packet) -> Result<(), PlaybackError> {
        match self.state {
            DecodeState::AwaitingPacket => {}
            DecodeState::DrainingFrames => {
                return Err(PlaybackError::SendFailed(
                    "packet sent before pending frames were drained".to_string(),
                ))
            }
            DecodeState::Flushing | DecodeState::Finished => {
                return Err(PlaybackError::SendFailed("decoder already flushed".to_string()))
            }
        }
        self.decoder.send_packet(packet)?;
        self.state = DecodeState::DrainingFrames;
        Ok(())
    }

    /// Signal end of input and switch to draining buffered frames
    pub fn finish(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            DecodeState::AwaitingPacket => {
                self.decoder.send_eof()?;
                self.state = DecodeState::Flushing;
                Ok(())
            }
            DecodeState::DrainingFrames => Err(PlaybackError::SendFailed(
                "end of input signalled before pending frames were drained".to_string(),
            )),
            DecodeState::Flushing | DecodeState::Finished => Ok(()),
        }
    }

    /// Receive the next frame into `frame`
    ///
    /// `WouldBlock` moves the session back to `AwaitingPacket`; `EndOfStream`
    /// moves it to `Finished`.
    pub fn receive_frame(&mut self, frame: &mut D::Frame) -> ReceiveOutcome {
        match self.state {
            DecodeState::AwaitingPacket => return ReceiveOutcome::WouldBlock,
            DecodeState::Finished => return ReceiveOutcome::EndOfStream,
            DecodeState::DrainingFrames | DecodeState::Flushing => {}
        }

        let outcome = self.decoder.receive_frame(frame);
        match (outcome, self.state) {
            (ReceiveOutcome::Frame, _) => self.frames_received += 1,
            (ReceiveOutcome::WouldBlock, DecodeState::DrainingFrames) => {
                self.state = DecodeState::AwaitingPacket;
            }
            // A flushed decoder that still wants input has nothing left to give
            (ReceiveOutcome::WouldBlock, _) => {
                self.state = DecodeState::Finished;
                return ReceiveOutcome::EndOfStream;
            }
            (ReceiveOutcome::EndOfStream, _) => self.state = DecodeState::Finished,
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MemoryDecoder, MemoryPacket, PixelFormat, PlanarFrame, StreamInfo};

    fn gray_stream() -> StreamInfo {
        StreamInfo::video(0, "rawvideo", 2, 2, PixelFormat::Gray8)
    }

    fn packet(frames: usize) -> MemoryPacket {
        MemoryPacket::new(0, vec![7u8; 4 * frames])
    }

    #[test]
    fn test_drain_returns_to_awaiting_packet() {
        let mut session = DecoderSession::new(MemoryDecoder::new(&gray_stream(), 0).unwrap());
        let mut frame = PlanarFrame::empty();

        session.send_packet(&packet(2)).unwrap();
        assert_eq!(session.state(), DecodeState::DrainingFrames);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::Frame);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::Frame);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::WouldBlock);
        assert_eq!(session.state(), DecodeState::AwaitingPacket);
        assert_eq!(session.frames_received(), 2);
    }

    #[test]
    fn test_send_while_draining_is_rejected() {
        let mut session = DecoderSession::new(MemoryDecoder::new(&gray_stream(), 0).unwrap());
        session.send_packet(&packet(1)).unwrap();
        assert!(matches!(
            session.send_packet(&packet(1)),
            Err(PlaybackError::SendFailed(_))
        ));
    }

    #[test]
    fn test_flush_releases_delayed_frames() {
        let mut session = DecoderSession::new(MemoryDecoder::new(&gray_stream(), 2).unwrap());
        let mut frame = PlanarFrame::empty();

        session.send_packet(&packet(1)).unwrap();
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::WouldBlock);
        session.send_packet(&packet(1)).unwrap();
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::WouldBlock);

        session.finish().unwrap();
        assert_eq!(session.state(), DecodeState::Flushing);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::Frame);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::Frame);
        assert_eq!(session.receive_frame(&mut frame), ReceiveOutcome::EndOfStream);
        assert_eq!(session.state(), DecodeState::Finished);
        assert!(session.send_packet(&packet(1)).is_err());
    }
}
