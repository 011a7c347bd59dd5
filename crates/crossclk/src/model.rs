use std::cell::RefCell;
use std::rc::Rc;

use crate::interface::{Interface, ReadInterface, WriteInterface};
use crate::kernel::{Kernel, Net};

/// The DUT's boundary pins. The harness only ever touches these.
#[derive(Debug, Clone)]
pub struct FifoPins {
    pub clk_a: Net,
    pub rst_a_n: Net,
    pub wr_en: Net,
    pub wr_data: Net,
    pub wr_rdy: Net,
    pub clk_b: Net,
    pub rst_b_n: Net,
    pub rd_en: Net,
    pub rd_data: Net,
    pub rd_rdy: Net,
}

impl FifoPins {
    pub fn new(kernel: &Kernel, width: u32) -> Self {
        Self {
            clk_a: kernel.net("clk_a", 1),
            rst_a_n: kernel.net("rst_a_n", 1),
            wr_en: kernel.net("wr_en", 1),
            wr_data: kernel.net("wr_data", width),
            wr_rdy: kernel.net("wr_rdy", 1),
            clk_b: kernel.net("clk_b", 1),
            rst_b_n: kernel.net("rst_b_n", 1),
            rd_en: kernel.net("rd_en", 1),
            rd_data: kernel.net("rd_data", width),
            rd_rdy: kernel.net("rd_rdy", 1),
        }
    }

    pub fn write_interface(&self) -> WriteInterface {
        WriteInterface::new(
            Interface::new(self.clk_a.clone(), self.rst_a_n.clone()),
            self.wr_en.clone(),
            self.wr_data.clone(),
            self.wr_rdy.clone(),
        )
    }

    pub fn read_interface(&self) -> ReadInterface {
        ReadInterface::new(
            Interface::new(self.clk_b.clone(), self.rst_b_n.clone()),
            self.rd_en.clone(),
            self.rd_data.clone(),
            self.rd_rdy.clone(),
        )
    }
}

#[derive(Debug)]
struct FifoState {
    mem: Vec<u64>,
    wptr: u64,
    rptr: u64,
    // Far pointer as seen through each side's two-stage synchronizer;
    // index 1 is the registered copy the side acts on.
    rptr_sync: [u64; 2],
    wptr_sync: [u64; 2],
}

/// Behavioral dual-clock FIFO standing in for the DUT.
///
/// Each side observes the far pointer through a two-stage synchronizer, so
/// readiness lags the far side by two own-domain edges and occupancy
/// estimates are conservative, never optimistic, like a real gray-pointer
/// design. Full is declared at `depth - 1` stored items.
pub struct FifoModel {
    pins: FifoPins,
    depth: usize,
    state: Rc<RefCell<FifoState>>,
}

impl FifoModel {
    /// `depth` must be a power of two.
    pub fn new(pins: FifoPins, depth: usize) -> Self {
        assert!(depth.is_power_of_two(), "fifo depth must be a power of two");
        Self {
            pins,
            depth,
            state: Rc::new(RefCell::new(FifoState {
                mem: vec![0; depth],
                wptr: 0,
                rptr: 0,
                rptr_sync: [0; 2],
                wptr_sync: [0; 2],
            })),
        }
    }

    /// DUT-declared capacity parameter.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Items currently stored (model introspection for tests).
    pub fn occupancy(&self) -> usize {
        let st = self.state.borrow();
        st.wptr.wrapping_sub(st.rptr) as usize
    }

    /// Spawn the write-domain and read-domain processes on `kernel`.
    pub fn start(&self, kernel: &Kernel) {
        kernel.spawn(Self::write_side(
            self.pins.clone(),
            Rc::clone(&self.state),
            self.depth as u64,
        ));
        kernel.spawn(Self::read_side(
            self.pins.clone(),
            Rc::clone(&self.state),
            self.depth as u64,
        ));
    }

    async fn write_side(pins: FifoPins, state: Rc<RefCell<FifoState>>, depth: u64) {
        loop {
            pins.clk_a.rising().await;
            if !pins.rst_a_n.is_high() {
                let mut st = state.borrow_mut();
                st.wptr = 0;
                st.rptr_sync = [0; 2];
                drop(st);
                pins.wr_rdy.drive(0);
                continue;
            }
            let mut st = state.borrow_mut();
            let full = st.wptr.wrapping_sub(st.rptr_sync[1]) >= depth - 1;
            if pins.wr_en.is_high() && !full {
                let slot = (st.wptr % depth) as usize;
                st.mem[slot] = pins.wr_data.value();
                st.wptr = st.wptr.wrapping_add(1);
            }
            st.rptr_sync[1] = st.rptr_sync[0];
            st.rptr_sync[0] = st.rptr;
            let full = st.wptr.wrapping_sub(st.rptr_sync[1]) >= depth - 1;
            drop(st);
            pins.wr_rdy.drive(u64::from(!full));
        }
    }

    async fn read_side(pins: FifoPins, state: Rc<RefCell<FifoState>>, depth: u64) {
        loop {
            pins.clk_b.rising().await;
            if !pins.rst_b_n.is_high() {
                let mut st = state.borrow_mut();
                st.rptr = 0;
                st.wptr_sync = [0; 2];
                drop(st);
                pins.rd_rdy.drive(0);
                pins.rd_data.drive(0);
                continue;
            }
            let mut st = state.borrow_mut();
            let empty = st.wptr_sync[1] == st.rptr;
            if pins.rd_en.is_high() && !empty {
                st.rptr = st.rptr.wrapping_add(1);
            }
            st.wptr_sync[1] = st.wptr_sync[0];
            st.wptr_sync[0] = st.wptr;
            let empty = st.wptr_sync[1] == st.rptr;
            let head = st.mem[(st.rptr % depth) as usize];
            drop(st);
            pins.rd_rdy.drive(u64::from(!empty));
            pins.rd_data.drive(if empty { 0 } else { head });
        }
    }
}
