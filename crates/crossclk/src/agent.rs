use std::cell::RefCell;
use std::rc::Rc;

use crate::interface::{ReadInterface, WriteInterface};

/// Drives one value per call through the write-side ready/valid handshake.
pub struct WriteDriver {
    wif: WriteInterface,
}

impl WriteDriver {
    pub fn new(wif: WriteInterface) -> Self {
        Self { wif }
    }

    /// Deliver `value` to the DUT.
    ///
    /// Samples `wr_rdy` in the settled window after each rising edge until it
    /// is asserted, then frames the enable pulse on the two following falling
    /// edges: drive data and enable on the first, release enable on the
    /// second. Sampling settled-after-rising and driving at falling edges
    /// keeps the sample and the drive out of the same edge. Returns once the
    /// pulse is released; callers serialize their own submissions.
    pub async fn submit(&self, value: u64) {
        self.wif.iface.redge().await;
        self.wif.iface.settle().await;
        while !self.wif.wr_rdy.is_high() {
            self.wif.iface.redge().await;
            self.wif.iface.settle().await;
        }
        self.wif.iface.fedge().await;
        self.wif.wr_data.drive(value);
        self.wif.wr_en.drive(1);
        self.wif.iface.fedge().await;
        self.wif.wr_en.drive(0);
    }
}

/// Continuously drains the read side into an ordered, append-only log.
pub struct ReadMonitor {
    rif: ReadInterface,
    received: Rc<RefCell<Vec<u64>>>,
}

impl ReadMonitor {
    pub fn new(rif: ReadInterface) -> Self {
        Self {
            rif,
            received: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared handle to the observed log.
    pub fn received(&self) -> Rc<RefCell<Vec<u64>>> {
        Rc::clone(&self.received)
    }

    /// Unending drain loop; the kernel cancels it when the run ends.
    ///
    /// Mirrors the writer's framing: sample `rd_rdy` settled-after-rising,
    /// and when asserted pulse `rd_en` across the next two falling edges.
    /// The data value is captured once, at assertion time.
    pub async fn run(self) {
        loop {
            self.rif.iface.redge().await;
            self.rif.iface.settle().await;
            if self.rif.rd_rdy.is_high() {
                self.rif.iface.fedge().await;
                self.rif.rd_en.drive(1);
                let value = self.rif.rd_data.value();
                self.rif.iface.fedge().await;
                self.rif.rd_en.drive(0);
                self.received.borrow_mut().push(value);
            }
        }
    }
}
