use std::collections::VecDeque;

use crate::types::DialogueTurn;

/// Ordered, capacity-bounded turn buffer.
///
/// `push` appends and then evicts from the front until the length is within
/// `limit`, so the retained turns are always the most recent ones in their
/// original order. A limit of zero retains nothing.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: VecDeque<DialogueTurn>,
    limit: usize,
}

impl ConversationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    pub fn push(&mut self, turn: DialogueTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<DialogueTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn turn(i: usize) -> DialogueTurn {
        DialogueTurn::assistant(format!("turn {}", i))
    }

    #[test]
    fn keeps_last_limit_turns_in_order() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.push(turn(i));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.snapshot(), vec![turn(2), turn(3), turn(4)]);
    }

    #[test]
    fn length_is_min_of_pushes_and_limit() {
        for limit in 0..5 {
            for pushes in 0..8 {
                let mut history = ConversationHistory::new(limit);
                for i in 0..pushes {
                    history.push(turn(i));
                    assert!(history.len() <= limit);
                }
                assert_eq!(history.len(), pushes.min(limit));
                let expected: Vec<_> = (pushes.saturating_sub(limit)..pushes).map(turn).collect();
                assert_eq!(history.snapshot(), expected);
            }
        }
    }

    #[test]
    fn zero_limit_retains_nothing() {
        let mut history = ConversationHistory::new(0);
        history.push(turn(0));
        assert!(history.is_empty());
    }

    #[test]
    fn clear_keeps_limit() {
        let mut history = ConversationHistory::new(2);
        history.push(turn(0));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.limit(), 2);
    }
}
