use crate::error::IceError;
use crate::peer::types::IceCandidate;
use log::debug;

/// Holds remote candidates that arrive before the remote description.
///
/// Once drained the queue stays empty for the rest of the negotiation
/// round; later candidates go straight to the peer connection.
#[derive(Debug, Default)]
pub struct IceCandidateQueue {
    pending: Vec<IceCandidate>,
    drained: bool,
}

impl IceCandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, candidate: IceCandidate) -> Result<(), IceError> {
        if self.drained {
            return Err(IceError::QueueDrained);
        }
        debug!(
            "Remote description not set yet, queuing candidate #{}",
            self.pending.len() + 1
        );
        self.pending.push(candidate);
        Ok(())
    }

    /// Applies `apply` to every queued candidate in arrival order and
    /// empties the queue. A failing candidate does not stop the rest; the
    /// failures come back in the same order.
    pub fn drain<F, E>(&mut self, mut apply: F) -> Vec<E>
    where
        F: FnMut(IceCandidate) -> Result<(), E>,
    {
        self.drained = true;
        let candidates: Vec<IceCandidate> = self.pending.drain(..).collect();
        debug!("Applying {} pending candidates", candidates.len());
        candidates
            .into_iter()
            .filter_map(|candidate| apply(candidate).err())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Drops everything without applying it, used on teardown.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u16) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: 0,
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let mut queue = IceCandidateQueue::new();
        for n in 1..=3 {
            queue.enqueue(cand(n)).unwrap();
        }
        assert_eq!(queue.len(), 3);

        let mut applied = Vec::new();
        let failures: Vec<()> = queue.drain(|c| {
            applied.push(c);
            Ok(())
        });
        assert!(failures.is_empty());
        assert_eq!(applied, vec![cand(1), cand(2), cand(3)]);
        assert!(queue.is_empty());
        assert!(queue.is_drained());
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let mut queue = IceCandidateQueue::new();
        for n in 1..=4 {
            queue.enqueue(cand(n)).unwrap();
        }
        let mut applied = 0;
        let failures = queue.drain(|c| {
            applied += 1;
            if c.candidate.starts_with("candidate:2 ") {
                Err(c.sdp_mline_index)
            } else {
                Ok(())
            }
        });
        assert_eq!(applied, 4);
        assert_eq!(failures, vec![0]);
    }

    #[test]
    fn drained_queue_refuses_new_candidates() {
        let mut queue = IceCandidateQueue::new();
        let _: Vec<()> = queue.drain(|_| Ok(()));
        assert_eq!(queue.enqueue(cand(9)), Err(IceError::QueueDrained));
        assert!(queue.is_empty());
    }
}
