/*! Specialized containers backing the socket buffers.

Everything in here is statically sized. There is no allocator to fall
back on, so a full buffer is a normal condition that every caller has to
handle by accepting fewer bytes.
*/

mod fifo;

pub use self::fifo::Fifo;
