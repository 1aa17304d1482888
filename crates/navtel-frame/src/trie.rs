//! Byte-prefix trie used to route NTCB bodies to their handlers.

use std::collections::BTreeMap;

#[derive(Debug)]
struct Node<V> {
    value: Option<V>,
    children: BTreeMap<u8, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

/// Maps registered byte prefixes to values; lookups return the longest
/// registered prefix of the input.
#[derive(Debug)]
pub struct PrefixTrie<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for PrefixTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PrefixTrie<V> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }

    /// Register `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let mut node = &mut self.root;
        for byte in key {
            node = node.children.entry(*byte).or_default();
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Longest registered key that is a prefix of `input`, with its value.
    pub fn longest_match(&self, input: &[u8]) -> Option<(usize, &V)> {
        let mut node = &self.root;
        let mut best = node.value.as_ref().map(|value| (0, value));

        for (depth, byte) in input.iter().enumerate() {
            match node.children.get(byte) {
                Some(next) => node = next,
                None => break,
            }
            if let Some(value) = node.value.as_ref() {
                best = Some((depth + 1, value));
            }
        }

        best
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
