use anyhow::Result;
use std::num::NonZeroUsize;

/// Groups a fallible item stream into ordered chunks of at most `size` items.
///
/// Only one chunk is held at a time. An error from the underlying stream is
/// passed through in place of the chunk being filled, and ends the sequence.
pub struct Batches<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Batches<I> {
    pub fn new(inner: I, size: NonZeroUsize) -> Self {
        Self {
            inner,
            size: size.get(),
            done: false,
        }
    }
}

impl<T, I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.size);
        while chunk.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => chunk.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

pub trait BatchExt: Iterator + Sized {
    fn batches(self, size: NonZeroUsize) -> Batches<Self> {
        Batches::new(self, size)
    }
}

impl<I: Iterator> BatchExt for I {}
