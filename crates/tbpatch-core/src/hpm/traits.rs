//! Register transport trait
//!
//! This trait uses `maybe_async` to support both sync and async modes.
//! - By default, the trait is async
//! - With the `is_sync` feature, it becomes synchronous

use crate::error::Result;
use maybe_async::maybe_async;

/// Register transport to chips behind a host processor manager
///
/// Implementations bind to a concrete driver (an HPM user client, a test
/// harness or the in-memory simulator). Opening the binding is the job of
/// the implementation's constructor; once built, a transport is owned by
/// exactly one device for its whole lifetime and released when the device
/// is dropped.
///
/// The transport does not serialize access between devices. Only one
/// command may be outstanding per chip address, which the device layer
/// guarantees by polling every command to completion.
///
/// # Example
///
/// ```ignore
/// #[maybe_async]
/// impl RegisterTransport for MyHpmClient {
///     async fn read_register(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize> {
///         self.user_client_read(chip, reg, buf).await.map_err(|code| TransportFault::new(code).into())
///     }
///     // ...
/// }
/// ```
#[maybe_async(AFIT)]
pub trait RegisterTransport {
    /// Read register `reg` of the chip at `chip`
    ///
    /// At most `buf.len()` bytes are read. Returns the number of bytes the
    /// chip actually produced, which may be less than requested.
    async fn read_register(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize>;

    /// Write `data` to register `reg` of the chip at `chip`
    async fn write_register(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()>;

    /// Issue a 4CC command to the chip at `chip`
    ///
    /// This only starts the command; completion is observed by polling the
    /// command register.
    async fn command(&mut self, chip: u64, cmd: u32) -> Result<()>;

    /// Delay for the specified number of microseconds
    async fn delay_us(&mut self, us: u32);
}

// Blanket impl for boxed transports to allow trait objects (sync mode only)
// In async mode, traits with async fn are not object-safe
#[cfg(feature = "is_sync")]
impl RegisterTransport for alloc::boxed::Box<dyn RegisterTransport + Send> {
    fn read_register(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize> {
        (**self).read_register(chip, reg, buf)
    }

    fn write_register(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()> {
        (**self).write_register(chip, reg, data)
    }

    fn command(&mut self, chip: u64, cmd: u32) -> Result<()> {
        (**self).command(chip, cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
