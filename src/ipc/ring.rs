/// 固定容量环形缓冲区
///
/// 有界通道的存储。满时 `push` 把元素原样退回。
pub struct Ring<T, const N: usize> {
    slots: [Option<T>; N],
    /// 队列头部索引
    head: usize,
    /// 队列尾部索引
    tail: usize,
    /// 队列中的元素数量
    count: usize,
}

impl<T, const N: usize> Ring<T, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// 入队 - O(1)
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.count >= N {
            return Err(value);
        }
        self.slots[self.tail] = Some(value);
        self.tail = (self.tail + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// 出队 - O(1)
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % N;
        self.count -= 1;
        value
    }

    /// 查看队首元素 - O(1)
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        if self.count == 0 {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
