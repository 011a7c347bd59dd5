use std::cell::RefCell;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::time::{TimeBase, TimeError, TimeUnit};
use crate::vcd::VcdWriter;

/// Handle to one boundary signal in the kernel's signal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(pub(crate) usize);

/// Direction of a signal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskId(usize);

#[derive(Debug, Clone, Copy)]
struct EdgeWaiter {
    task: TaskId,
    edge: EdgeKind,
}

/// A timed wake-up in the event queue.
#[derive(Debug, Clone, Copy)]
struct TimedWake {
    time: u64,
    seq: u64,
    task: TaskId,
}

impl PartialEq for TimedWake {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for TimedWake {}

impl PartialOrd for TimedWake {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedWake {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earlier time has higher priority (BinaryHeap is a Max-Heap);
        // FIFO among wakes scheduled for the same time.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SignalSlot {
    name: String,
    width: u32,
    value: u64,
    waiters: Vec<EdgeWaiter>,
}

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

struct TaskSlot {
    future: Option<TaskFuture>,
    done: bool,
    join_waiters: Vec<TaskId>,
}

struct KernelState {
    time: u64,
    seq: u64,
    precision: TimeUnit,
    signals: Vec<SignalSlot>,
    tasks: Vec<TaskSlot>,
    wakes: BinaryHeap<TimedWake>,
    reaction: VecDeque<TaskId>,
    settled: VecDeque<TaskId>,
    current: Option<TaskId>,
    tracer: Option<VcdWriter>,
}

/// The discrete-event simulation kernel: simulated time, the boundary signal
/// table, and a single-threaded cooperative executor for harness processes.
///
/// Tasks suspend only at explicit points (edge waits, timed waits, the settle
/// window, task joins); between suspension points execution is atomic with
/// respect to every other task. Each processed timestep has two phases: the
/// reaction cascade (edge-triggered tasks, until quiescent) and the settled
/// window (tasks that asked to sample stable values). A drive from the
/// settled window that releases new edge waiters re-enters the reaction
/// cascade within the same timestep.
#[derive(Clone)]
pub struct Kernel {
    state: Rc<RefCell<KernelState>>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("time", &self.now()).finish()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Kernel with the default picosecond tick.
    pub fn new() -> Self {
        Self::with_precision(TimeUnit::Ps).expect("ps is a valid precision")
    }

    /// Kernel whose tick is one `precision` unit. `step` is not a concrete
    /// unit and is rejected.
    pub fn with_precision(precision: TimeUnit) -> Result<Self, TimeError> {
        if precision == TimeUnit::Step {
            return Err(TimeError::UnsupportedUnit("step".to_string()));
        }
        Ok(Self {
            state: Rc::new(RefCell::new(KernelState {
                time: 0,
                seq: 0,
                precision,
                signals: Vec::new(),
                tasks: Vec::new(),
                wakes: BinaryHeap::new(),
                reaction: VecDeque::new(),
                settled: VecDeque::new(),
                current: None,
                tracer: None,
            })),
        })
    }

    /// Current simulation time in kernel ticks.
    pub fn now(&self) -> u64 {
        self.state.borrow().time
    }

    /// Time of the next scheduled wake, if any.
    pub fn next_event_time(&self) -> Option<u64> {
        self.state.borrow().wakes.peek().map(|w| w.time)
    }

    /// Unit converter anchored at this kernel's tick.
    pub fn time_base(&self) -> TimeBase {
        // `precision` is never `Step`, so the step argument is inert here.
        TimeBase::new(self.state.borrow().precision.exponent(0))
    }

    /// Register a boundary signal, initialized to 0.
    pub fn net(&self, name: &str, width: u32) -> Net {
        let mut st = self.state.borrow_mut();
        let id = SignalId(st.signals.len());
        st.signals.push(SignalSlot {
            name: name.to_string(),
            width,
            value: 0,
            waiters: Vec::new(),
        });
        Net {
            kernel: self.clone(),
            id,
        }
    }

    /// Settled value of a signal.
    pub fn get(&self, id: SignalId) -> u64 {
        self.state.borrow().signals[id.0].value
    }

    /// Drive a new value. A toggle of a 1-bit signal releases matching edge
    /// waiters into the current reaction cascade.
    pub fn set(&self, id: SignalId, value: u64) {
        let mut st = self.state.borrow_mut();
        let st = &mut *st;
        let slot = &mut st.signals[id.0];
        let masked = if slot.width >= 64 {
            value
        } else {
            value & ((1u64 << slot.width) - 1)
        };
        let old = slot.value;
        slot.value = masked;
        if slot.width != 1 || old == masked {
            return;
        }
        let edge = if masked != 0 {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        };
        let mut fired = Vec::new();
        slot.waiters.retain(|w| {
            if w.edge == edge {
                fired.push(w.task);
                false
            } else {
                true
            }
        });
        for task in fired {
            st.reaction.push_back(task);
        }
    }

    /// Suspend the calling task until the next matching edge on `id`.
    pub fn edge(&self, id: SignalId, edge: EdgeKind) -> EdgeFuture {
        EdgeFuture {
            kernel: self.clone(),
            id,
            edge,
            armed: false,
        }
    }

    /// Suspend the calling task for `ticks` kernel ticks.
    pub fn delay(&self, ticks: u64) -> DelayFuture {
        DelayFuture {
            kernel: self.clone(),
            ticks,
            armed: false,
        }
    }

    /// Suspend the calling task until the current timestep's reaction cascade
    /// has quiesced: the settled window, where sampled values are stable.
    pub fn settle(&self) -> SettleFuture {
        SettleFuture {
            kernel: self.clone(),
            armed: false,
        }
    }

    /// Add a background task. It gets its first poll within the current (or,
    /// before `run`, the initial) timestep.
    pub fn spawn<F>(&self, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let mut st = self.state.borrow_mut();
        let id = TaskId(st.tasks.len());
        st.tasks.push(TaskSlot {
            future: Some(Box::pin(future)),
            done: false,
            join_waiters: Vec::new(),
        });
        st.reaction.push_back(id);
        TaskHandle {
            kernel: self.clone(),
            id,
        }
    }

    /// Drive the event loop until `main` completes, then tear every remaining
    /// task down (the end-of-test cancellation point).
    ///
    /// Panics if no task is runnable and no wake is pending while `main` is
    /// still incomplete; a deadlocked harness is a bug, not a recoverable
    /// condition.
    pub fn run<T: 'static>(&self, main: impl Future<Output = T> + 'static) -> T {
        let result: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&result);
        let handle = self.spawn(async move {
            *slot.borrow_mut() = Some(main.await);
        });
        loop {
            self.run_timestep();
            self.dump_trace();
            if self.task_done(handle.id) {
                break;
            }
            if !self.advance() {
                panic!(
                    "simulation deadlock: no runnable task and no pending wake at t={}",
                    self.now()
                );
            }
        }
        self.teardown();
        let value = result.borrow_mut().take();
        value.expect("main task completed without a result")
    }

    /// Dump a value-change trace of every registered signal to `path`, once
    /// per processed timestep.
    pub fn trace_vcd<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut st = self.state.borrow_mut();
        let signals: Vec<(String, u32, SignalId)> = st
            .signals
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), s.width, SignalId(i)))
            .collect();
        let writer = VcdWriter::new(path, st.precision, &signals)?;
        st.tracer = Some(writer);
        Ok(())
    }

    fn dump_trace(&self) {
        let mut st = self.state.borrow_mut();
        let st = &mut *st;
        if let Some(tracer) = st.tracer.as_mut() {
            let signals = &st.signals;
            if let Err(e) = tracer.dump(st.time, |id| signals[id.0].value) {
                log::warn!("vcd dump failed: {}", e);
            }
        }
    }

    /// Process every task scheduled at the current time: the reaction queue
    /// to quiescence, then settled tasks one at a time, re-draining the
    /// reaction queue whenever a settled task's drive releases new waiters.
    fn run_timestep(&self) {
        loop {
            while let Some(task) = self.pop_reaction() {
                self.poll_task(task);
            }
            let Some(task) = self.pop_settled() else { break };
            self.poll_task(task);
        }
    }

    fn pop_reaction(&self) -> Option<TaskId> {
        self.state.borrow_mut().reaction.pop_front()
    }

    fn pop_settled(&self) -> Option<TaskId> {
        self.state.borrow_mut().settled.pop_front()
    }

    /// Advance to the next scheduled wake time and queue everything due then.
    /// Returns false when the wake queue is empty.
    fn advance(&self) -> bool {
        let mut st = self.state.borrow_mut();
        let Some(head) = st.wakes.peek() else {
            return false;
        };
        let time = head.time;
        st.time = time;
        while let Some(head) = st.wakes.peek() {
            if head.time != time {
                break;
            }
            let wake = st.wakes.pop().expect("peeked wake must pop");
            st.reaction.push_back(wake.task);
        }
        true
    }

    fn poll_task(&self, id: TaskId) {
        let mut future = {
            let mut st = self.state.borrow_mut();
            let slot = &mut st.tasks[id.0];
            if slot.done {
                return;
            }
            let Some(future) = slot.future.take() else {
                return;
            };
            st.current = Some(id);
            future
        };
        let mut cx = Context::from_waker(Waker::noop());
        let poll = future.as_mut().poll(&mut cx);
        let mut st = self.state.borrow_mut();
        st.current = None;
        match poll {
            Poll::Ready(()) => {
                st.tasks[id.0].done = true;
                let waiters = std::mem::take(&mut st.tasks[id.0].join_waiters);
                for task in waiters {
                    st.reaction.push_back(task);
                }
            }
            Poll::Pending => st.tasks[id.0].future = Some(future),
        }
    }

    fn teardown(&self) {
        let mut st = self.state.borrow_mut();
        st.tasks.clear();
        st.reaction.clear();
        st.settled.clear();
        st.wakes.clear();
        for slot in &mut st.signals {
            slot.waiters.clear();
        }
    }

    fn current_task(st: &KernelState) -> TaskId {
        st.current
            .expect("suspension primitive used outside a kernel task")
    }

    fn register_edge(&self, id: SignalId, edge: EdgeKind) {
        let mut st = self.state.borrow_mut();
        let task = Self::current_task(&st);
        st.signals[id.0].waiters.push(EdgeWaiter { task, edge });
    }

    fn register_timer(&self, ticks: u64) {
        let mut st = self.state.borrow_mut();
        let task = Self::current_task(&st);
        let time = st.time + ticks;
        let seq = st.seq;
        st.seq += 1;
        st.wakes.push(TimedWake { time, seq, task });
    }

    fn register_settle(&self) {
        let mut st = self.state.borrow_mut();
        let task = Self::current_task(&st);
        st.settled.push_back(task);
    }

    fn register_join(&self, id: TaskId) {
        let mut st = self.state.borrow_mut();
        let task = Self::current_task(&st);
        st.tasks[id.0].join_waiters.push(task);
    }

    fn task_done(&self, id: TaskId) -> bool {
        self.state.borrow().tasks[id.0].done
    }
}

/// Handle to a spawned task.
#[derive(Clone)]
pub struct TaskHandle {
    kernel: Kernel,
    id: TaskId,
}

impl TaskHandle {
    /// Suspend the calling task until this one completes.
    pub fn join(&self) -> JoinFuture {
        JoinFuture {
            kernel: self.kernel.clone(),
            id: self.id,
            armed: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.kernel.task_done(self.id)
    }
}

/// Capability handle for one boundary signal: read the settled value, drive a
/// new value, await its edges.
#[derive(Clone)]
pub struct Net {
    kernel: Kernel,
    id: SignalId,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("id", &self.id)
            .field("value", &self.value())
            .finish()
    }
}

impl Net {
    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn value(&self) -> u64 {
        self.kernel.get(self.id)
    }

    pub fn is_high(&self) -> bool {
        self.value() != 0
    }

    pub fn drive(&self, value: u64) {
        self.kernel.set(self.id, value);
    }

    pub fn rising(&self) -> EdgeFuture {
        self.kernel.edge(self.id, EdgeKind::Rising)
    }

    pub fn falling(&self) -> EdgeFuture {
        self.kernel.edge(self.id, EdgeKind::Falling)
    }

    /// Wait for `count` rising edges.
    pub async fn cycles(&self, count: u32) {
        for _ in 0..count {
            self.rising().await;
        }
    }
}

/// Future returned by [`Kernel::edge`]; resolves at the next matching edge.
pub struct EdgeFuture {
    kernel: Kernel,
    id: SignalId,
    edge: EdgeKind,
    armed: bool,
}

impl Future for EdgeFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.armed = true;
        let kernel = self.kernel.clone();
        kernel.register_edge(self.id, self.edge);
        Poll::Pending
    }
}

/// Future returned by [`Kernel::delay`].
pub struct DelayFuture {
    kernel: Kernel,
    ticks: u64,
    armed: bool,
}

impl Future for DelayFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.armed = true;
        let kernel = self.kernel.clone();
        kernel.register_timer(self.ticks);
        Poll::Pending
    }
}

/// Future returned by [`Kernel::settle`].
pub struct SettleFuture {
    kernel: Kernel,
    armed: bool,
}

impl Future for SettleFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.armed = true;
        let kernel = self.kernel.clone();
        kernel.register_settle();
        Poll::Pending
    }
}

/// Future returned by [`TaskHandle::join`].
pub struct JoinFuture {
    kernel: Kernel,
    id: TaskId,
    armed: bool,
}

impl Future for JoinFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.kernel.task_done(self.id) {
            return Poll::Ready(());
        }
        if !self.armed {
            self.armed = true;
            let kernel = self.kernel.clone();
            kernel.register_join(self.id);
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_time_order() {
        let kernel = Kernel::new();
        let log: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
        for ticks in [30u64, 10, 20] {
            let kernel2 = kernel.clone();
            let log = Rc::clone(&log);
            kernel.spawn(async move {
                kernel2.delay(ticks).await;
                log.borrow_mut().push(ticks);
            });
        }
        let kernel2 = kernel.clone();
        let log2 = Rc::clone(&log);
        let order = kernel.run(async move {
            kernel2.delay(40).await;
            log2.borrow().clone()
        });
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn settled_sample_sees_the_reaction_cascade_result() {
        let kernel = Kernel::new();
        let clk = kernel.net("clk", 1);
        let data = kernel.net("data", 8);

        // Reacts to the edge by driving data, like a registered output.
        let clk_r = clk.clone();
        let data_r = data.clone();
        kernel.spawn(async move {
            clk_r.rising().await;
            data_r.drive(0x42);
        });

        // Toggles the clock after a delay.
        let kernel2 = kernel.clone();
        let clk_d = clk.clone();
        kernel.spawn(async move {
            kernel2.delay(5).await;
            clk_d.drive(1);
        });

        let kernel3 = kernel.clone();
        let sampled = kernel.run(async move {
            clk.rising().await;
            kernel3.settle().await;
            data.value()
        });
        assert_eq!(sampled, 0x42);
    }

    #[test]
    fn join_resumes_after_completion() {
        let kernel = Kernel::new();
        let kernel2 = kernel.clone();
        let handle = kernel.spawn(async move {
            kernel2.delay(10).await;
        });
        let kernel3 = kernel.clone();
        let end = kernel.run(async move {
            handle.join().await;
            kernel3.now()
        });
        assert_eq!(end, 10);
    }

    #[test]
    fn drives_mask_to_signal_width() {
        let kernel = Kernel::new();
        let data = kernel.net("data", 4);
        data.drive(0xFF);
        assert_eq!(data.value(), 0xF);
    }

    #[test]
    fn falling_edges_only_wake_falling_waiters() {
        let kernel = Kernel::new();
        let clk = kernel.net("clk", 1);
        let kernel2 = kernel.clone();
        let clk_d = clk.clone();
        kernel.spawn(async move {
            kernel2.delay(3).await;
            clk_d.drive(1);
            kernel2.delay(3).await;
            clk_d.drive(0);
        });
        let kernel3 = kernel.clone();
        let at = kernel.run(async move {
            clk.falling().await;
            kernel3.now()
        });
        assert_eq!(at, 6);
    }

    #[test]
    #[should_panic(expected = "simulation deadlock")]
    fn waiting_on_an_undriven_net_deadlocks() {
        let kernel = Kernel::new();
        let idle = kernel.net("idle", 1);
        kernel.run(async move {
            idle.rising().await;
        });
    }
}
