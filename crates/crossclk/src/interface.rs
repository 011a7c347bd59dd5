use crate::kernel::Net;

/// Clock/reset pair for one domain.
#[derive(Debug, Clone)]
pub struct Interface {
    pub clk: Net,
    pub rst_n: Net,
}

impl Interface {
    pub fn new(clk: Net, rst_n: Net) -> Self {
        Self { clk, rst_n }
    }

    pub async fn redge(&self) {
        self.clk.rising().await;
    }

    pub async fn fedge(&self) {
        self.clk.falling().await;
    }

    /// Suspend into the settled window of the current timestep.
    pub async fn settle(&self) {
        self.clk.kernel().settle().await;
    }

    /// Hold reset active (low) for `cycles` of this domain's clock, then
    /// release it.
    pub async fn apply_reset(&self, cycles: u32) {
        self.rst_n.drive(0);
        self.clk.cycles(cycles).await;
        self.rst_n.drive(1);
    }
}

/// Write-side boundary bundle.
#[derive(Debug, Clone)]
pub struct WriteInterface {
    pub iface: Interface,
    pub wr_en: Net,
    pub wr_data: Net,
    pub wr_rdy: Net,
}

impl WriteInterface {
    pub fn new(iface: Interface, wr_en: Net, wr_data: Net, wr_rdy: Net) -> Self {
        Self {
            iface,
            wr_en,
            wr_data,
            wr_rdy,
        }
    }
}

/// Read-side boundary bundle.
#[derive(Debug, Clone)]
pub struct ReadInterface {
    pub iface: Interface,
    pub rd_en: Net,
    pub rd_data: Net,
    pub rd_rdy: Net,
}

impl ReadInterface {
    pub fn new(iface: Interface, rd_en: Net, rd_data: Net, rd_rdy: Net) -> Self {
        Self {
            iface,
            rd_en,
            rd_data,
            rd_rdy,
        }
    }
}
