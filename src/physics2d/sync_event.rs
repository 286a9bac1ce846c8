//! Announcement of the pipes a simulation has open, for late joiners.
//!
//! Wire format, big-endian: `u32 count`, then eight `u32` per pipe in
//! [`PipeDescriptor::to_array`] order.

use crate::error::{TesseraError, TesseraResult};
use crate::transform::PipeDescriptor;

use super::world::TransformationPipes;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynchronisePhysicsEvent {
    pub pipes: Vec<PipeDescriptor>,
}

impl SynchronisePhysicsEvent {
    pub fn new(pipes: Vec<PipeDescriptor>) -> Self {
        Self { pipes }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.pipes.len() * 32);
        out.extend_from_slice(&(self.pipes.len() as u32).to_be_bytes());
        for pipe in &self.pipes {
            for field in pipe.to_array() {
                out.extend_from_slice(&field.to_be_bytes());
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> TesseraResult<Self> {
        let mut words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
        let count = words.next().ok_or(TesseraError::Truncated {
            expected: 4,
            actual: bytes.len(),
        })? as usize;

        let expected = 4 + count * 32;
        if bytes.len() < expected {
            return Err(TesseraError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            let mut fields = [0u32; 8];
            for field in &mut fields {
                // Length was checked above.
                *field = words.next().unwrap_or_default();
            }
            pipes.push(PipeDescriptor::from_array(fields));
        }
        Ok(Self { pipes })
    }

    /// Open the announced pipes on the receiving side.
    pub fn execute(&self, pipes: &mut dyn TransformationPipes) {
        for descriptor in &self.pipes {
            pipes.open_remote_pipe(*descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(n: u32) -> PipeDescriptor {
        PipeDescriptor::from_array([n, n + 1, n + 2, n + 3, n + 4, n + 5, n + 6, n + 7])
    }

    #[test]
    fn test_layout() {
        let event = SynchronisePhysicsEvent::new(vec![descriptor(1)]);
        let bytes = event.encode();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 1]);
        assert_eq!(&bytes[32..36], &[0, 0, 0, 8]);
    }

    #[test]
    fn test_decode() {
        let event = SynchronisePhysicsEvent::new(vec![descriptor(10), descriptor(20)]);
        assert_eq!(SynchronisePhysicsEvent::decode(&event.encode()).unwrap(), event);
        let empty = SynchronisePhysicsEvent::default();
        assert_eq!(SynchronisePhysicsEvent::decode(&empty.encode()).unwrap(), empty);
    }

    #[test]
    fn test_truncated() {
        let bytes = SynchronisePhysicsEvent::new(vec![descriptor(1), descriptor(2)]).encode();
        assert!(matches!(
            SynchronisePhysicsEvent::decode(&bytes[..40]),
            Err(TesseraError::Truncated {
                expected: 68,
                actual: 40
            })
        ));
        assert!(SynchronisePhysicsEvent::decode(&[0, 0]).is_err());
    }

    #[test]
    fn test_execute_opens_remote_pipes() {
        struct Recorder(Vec<PipeDescriptor>);
        impl TransformationPipes for Recorder {
            fn open_pipe(
                &mut self,
                _: PipeDescriptor,
            ) -> Option<Box<dyn super::super::world::TransformationPipe>> {
                None
            }
            fn open_remote_pipe(&mut self, descriptor: PipeDescriptor) {
                self.0.push(descriptor);
            }
        }

        let event = SynchronisePhysicsEvent::new(vec![descriptor(3)]);
        let mut recorder = Recorder(Vec::new());
        event.execute(&mut recorder);
        assert_eq!(recorder.0, vec![descriptor(3)]);
    }
}
