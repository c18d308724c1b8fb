//! 有界集合 - 超过容量时按插入顺序淘汰最旧的元素

use std::collections::{HashSet, VecDeque};

/// FIFO 有界集合
#[derive(Debug, Clone)]
pub struct BoundedSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl BoundedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            members: HashSet::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.members.contains(value)
    }

    /// 插入元素，返回是否为新元素
    ///
    /// 已存在的元素不会刷新位置。
    pub fn insert(&mut self, value: String) -> bool {
        if self.members.contains(&value) {
            return false;
        }
        self.members.insert(value.clone());
        self.order.push_back(value);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
