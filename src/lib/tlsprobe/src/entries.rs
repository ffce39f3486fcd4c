//! The probed thread-local entries.

use std::{cell::Cell, hint::black_box};

use serde::Serialize;

/// Initial value of the pre-initialized entry.
pub const TDATA_INIT: u32 = 0xdeadbeef;

thread_local! {
    // Zero-initialized, lands in .tbss.
    static TBSS_ENTRY: Cell<u32> = const { Cell::new(0) };
    // Non-zero initializer, lands in .tdata.
    static TDATA_ENTRY: Cell<u32> = const { Cell::new(TDATA_INIT) };
}

/// Values of both entries as seen by one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TlsSnapshot {
    pub tbss: u32,
    pub tdata: u32,
}

impl TlsSnapshot {
    /// The values a thread observes before anything writes to its entries.
    pub const fn initial() -> Self {
        Self {
            tbss: 0,
            tdata: TDATA_INIT,
        }
    }
}

/// Read both entries on the current thread.
pub fn snapshot() -> TlsSnapshot {
    // The reference escapes through black_box so the never-written entries aren't folded into
    // constants and dropped from the TLS template.
    let tbss = TBSS_ENTRY.with(|entry| black_box(entry).get());
    let tdata = TDATA_ENTRY.with(|entry| black_box(entry).get());
    tracing::trace!("tls snapshot: tbss={} tdata={:#x}", tbss, tdata);
    TlsSnapshot { tbss, tdata }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread};

    use super::*;

    #[test]
    fn initial_values() {
        assert_eq!(snapshot(), TlsSnapshot::initial());
        assert_eq!(snapshot().tdata, 3735928559);
    }

    #[test]
    fn writes_stay_on_their_thread() {
        TBSS_ENTRY.with(|e| e.set(7));
        TDATA_ENTRY.with(|e| e.set(8));

        let (send, recv) = mpsc::channel();
        let child = thread::spawn(move || {
            let fresh = snapshot();
            TBSS_ENTRY.with(|e| e.set(100));
            TDATA_ENTRY.with(|e| e.set(200));
            send.send((fresh, snapshot())).unwrap();
        });
        child.join().unwrap();
        let (fresh, written) = recv.recv().unwrap();

        assert_eq!(fresh, TlsSnapshot::initial());
        assert_eq!(written, TlsSnapshot { tbss: 100, tdata: 200 });
        assert_eq!(snapshot(), TlsSnapshot { tbss: 7, tdata: 8 });
    }

    #[test]
    fn many_threads_start_fresh() {
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                thread::spawn(move || {
                    let before = snapshot();
                    TBSS_ENTRY.with(|e| e.set(i));
                    (before, snapshot().tbss)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let (before, after) = handle.join().unwrap();
            assert_eq!(before, TlsSnapshot::initial());
            assert_eq!(after, i as u32);
        }
    }
}
