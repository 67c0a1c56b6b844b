//! EmberOS Cooperative Task Management
//!
//! A fixed pool of task descriptors linked into a singly linked run list by
//! pool index. Exactly one task is `Running` between scheduler entries; the
//! only scheduling points are explicit `yield_now`/`sleep`/`exit` calls.
//! The timer ISR merely accounts sleep ticks.
//!
//! Every live task's stack starts with a canary word; the scheduler audits
//! all canaries on entry and panics on a mismatch. Terminated tasks are
//! unlinked and their stacks returned to the kernel heap by the next
//! scheduler pass that runs on some other task's stack.

#![no_std]

use spin::Mutex;

pub mod context;

pub use context::Context;

/// Fixed descriptor pool capacity
pub const MAX_TASKS: usize = 8;

/// Per-task kernel stack size in bytes
pub const STACK_SIZE: usize = 4096;

/// Sentinel written at the bottom of every task stack
pub const STACK_CANARY: u32 = 0xDEAD_BEEF;

/// Pool index of a task
pub type TaskId = usize;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskState {
    Running,
    Ready,
    Blocked,
    Sleeping,
    Terminated,
}

/// One task descriptor
pub struct Task {
    pub id: u32,
    pub state: TaskState,
    context: Context,
    /// Heap block backing the stack; the canary lives at offset 0
    stack: *mut u8,
    sleep_ticks: u32,
    /// Pool index of the next task in the run list
    next: Option<TaskId>,
}

// Descriptors only move between tasks through the table Mutex.
unsafe impl Send for Task {}

/// The descriptor pool plus the run-list bookkeeping.
///
/// All scheduling policy lives here, free of assembly, so it can be
/// exercised directly. The global wrappers below add the actual context
/// switch and stack management.
pub struct TaskTable {
    slots: [Option<Task>; MAX_TASKS],
    head: Option<TaskId>,
    current: Option<TaskId>,
    next_id: u32,
}

impl TaskTable {
    pub const fn new() -> Self {
        const EMPTY: Option<Task> = None;
        TaskTable {
            slots: [EMPTY; MAX_TASKS],
            head: None,
            current: None,
            next_id: 1,
        }
    }

    /// Add a task in `Ready` state at the tail of the run list. The first
    /// task admitted becomes current. `None` when the pool is full.
    pub fn admit(&mut self, context: Context, stack: *mut u8) -> Option<TaskId> {
        let slot = self.slots.iter().position(|entry| entry.is_none())?;
        let id = self.next_id;
        self.next_id += 1;
        self.slots[slot] = Some(Task {
            id,
            state: TaskState::Ready,
            context,
            stack,
            sleep_ticks: 0,
            next: None,
        });

        match self.head {
            None => self.head = Some(slot),
            Some(head) => {
                let mut tail = head;
                while let Some(next) = self.slots[tail].as_ref().and_then(|task| task.next) {
                    tail = next;
                }
                if let Some(task) = self.slots[tail].as_mut() {
                    task.next = Some(slot);
                }
            }
        }
        if self.current.is_none() {
            self.current = Some(slot);
        }
        Some(slot)
    }

    fn task(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id).and_then(|slot| slot.as_ref())
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id).and_then(|slot| slot.as_mut())
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.task(id).map(|task| task.state)
    }

    /// Verify the canary word of every non-terminated task.
    pub fn audit_canaries(&self) -> Result<(), u32> {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let task = match self.task(id) {
                Some(task) => task,
                None => break,
            };
            if task.state != TaskState::Terminated && !task.stack.is_null() {
                // SAFETY: stack points at a live STACK_SIZE heap block owned
                // by this task; the canary occupies its first word.
                let canary = unsafe { (task.stack as *const u32).read_volatile() };
                if canary != STACK_CANARY {
                    return Err(task.id);
                }
            }
            cursor = task.next;
        }
        Ok(())
    }

    /// Unlink every terminated task except the current one and hand back
    /// their stacks for freeing.
    pub fn reap_terminated(&mut self) -> [Option<*mut u8>; MAX_TASKS] {
        let mut stacks = [None; MAX_TASKS];
        let mut reaped = 0;

        let mut prev: Option<TaskId> = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let (state, next, stack) = match self.task(id) {
                Some(task) => (task.state, task.next, task.stack),
                None => break,
            };
            if state == TaskState::Terminated && Some(id) != self.current {
                match prev {
                    Some(prev_id) => {
                        if let Some(task) = self.task_mut(prev_id) {
                            task.next = next;
                        }
                    }
                    None => self.head = next,
                }
                self.slots[id] = None;
                stacks[reaped] = Some(stack);
                reaped += 1;
            } else {
                prev = Some(id);
            }
            cursor = next;
        }
        stacks
    }

    /// Round-robin choice: starting from `current.next` and wrapping via the
    /// head, the first `Ready` task; the current task if it is still
    /// `Ready`; otherwise the current task.
    pub fn pick_next(&self) -> Option<TaskId> {
        let current = self.current?;
        let mut cursor = self.task(current).and_then(|task| task.next).or(self.head);
        while let Some(id) = cursor {
            if id == current {
                break;
            }
            if self.state_of(id) == Some(TaskState::Ready) {
                return Some(id);
            }
            cursor = self.task(id).and_then(|task| task.next).or(self.head);
        }
        Some(current)
    }

    /// Pick the next task and flip the Running/Ready states. `None` when no
    /// switch is needed; otherwise the (previous, chosen) pair.
    pub fn choose(&mut self) -> Option<(TaskId, TaskId)> {
        let current = self.current?;
        let next = self.pick_next()?;
        if next == current {
            // The scheduler chose current to keep the CPU; it is Running
            // even though no switch happens.
            if let Some(task) = self.task_mut(current) {
                task.state = TaskState::Running;
            }
            return None;
        }
        if let Some(task) = self.task_mut(current) {
            if task.state == TaskState::Running {
                task.state = TaskState::Ready;
            }
        }
        if let Some(task) = self.task_mut(next) {
            task.state = TaskState::Running;
        }
        self.current = Some(next);
        Some((current, next))
    }

    /// Put the current task to sleep for `ticks`. Returns whether a yield
    /// should follow (false for a zero duration or no current task).
    pub fn sleep_current(&mut self, ticks: u32) -> bool {
        if ticks == 0 {
            return false;
        }
        let current = match self.current {
            Some(current) => current,
            None => return false,
        };
        if let Some(task) = self.task_mut(current) {
            task.sleep_ticks = ticks;
            task.state = TaskState::Sleeping;
            return true;
        }
        false
    }

    /// Mark the current task terminated (reaped by a later scheduler pass).
    pub fn terminate_current(&mut self) {
        if let Some(current) = self.current {
            if let Some(task) = self.task_mut(current) {
                task.state = TaskState::Terminated;
            }
        }
    }

    /// Clear a task's sleep counter and make it runnable if it was sleeping
    /// or blocked. A wake on a `Ready` task is a no-op.
    pub fn wake(&mut self, id: TaskId) {
        if let Some(task) = self.task_mut(id) {
            task.sleep_ticks = 0;
            if matches!(task.state, TaskState::Sleeping | TaskState::Blocked) {
                task.state = TaskState::Ready;
            }
        }
    }

    /// Timer-tick accounting: every sleeping task with a positive counter
    /// counts down; at zero it becomes `Ready`.
    pub fn tick(&mut self) {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let next = self.task(id).and_then(|task| task.next);
            if let Some(task) = self.task_mut(id) {
                if task.state == TaskState::Sleeping && task.sleep_ticks > 0 {
                    task.sleep_ticks -= 1;
                    if task.sleep_ticks == 0 {
                        task.state = TaskState::Ready;
                    }
                }
            }
            cursor = next;
        }
    }

    /// Stable pointer to a task's saved context (the pool lives in a static).
    pub fn context_ptr(&mut self, id: TaskId) -> *mut Context {
        match self.task_mut(id) {
            Some(task) => &mut task.context as *mut Context,
            None => core::ptr::null_mut(),
        }
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global task table
static TASKS: Mutex<TaskTable> = Mutex::new(TaskTable::new());

/// Run `f` with exclusive table access. Interrupts stay masked for the
/// duration so the timer ISR can never spin on a lock a task holds.
#[cfg(target_arch = "x86")]
fn with_table<R>(f: impl FnOnce(&mut TaskTable) -> R) -> R {
    ember_arch::cpu::without_interrupts(|| f(&mut TASKS.lock()))
}

#[cfg(not(target_arch = "x86"))]
fn with_table<R>(f: impl FnOnce(&mut TaskTable) -> R) -> R {
    f(&mut TASKS.lock())
}

/// Reset the task subsystem. Called once from `kernel_main`.
pub fn init() {
    with_table(|table| *table = TaskTable::new());
}

/// Timer-ISR entry: account one tick of sleep time. The ISR runs with
/// interrupts disabled and every task-level path masks interrupts while
/// holding the lock, so this never contends.
pub fn tick() {
    TASKS.lock().tick();
}

/// Wake a sleeping or blocked task.
pub fn wake(id: TaskId) {
    with_table(|table| table.wake(id));
}

/// Pool index of the currently running task.
pub fn current_task() -> Option<TaskId> {
    with_table(|table| table.current())
}

#[cfg(target_arch = "x86")]
mod switching {
    use ember_arch::cpu;
    use ember_mem::heap;

    use super::context::{context_switch, task_trampoline, Context};
    use super::{with_table, TaskId, STACK_CANARY, STACK_SIZE};

    /// Lay down the startup frame the trampoline expects (top down):
    /// alignment word, `task_exit`, the entry point, four zeroed
    /// callee-saved slots. Returns the initial stack pointer.
    unsafe fn build_initial_frame(stack: *mut u8, entry: u32, exit: u32) -> u32 {
        let mut sp = stack.add(STACK_SIZE) as *mut u32;
        sp = sp.sub(1);
        sp.write(0);
        sp = sp.sub(1);
        sp.write(exit);
        sp = sp.sub(1);
        sp.write(entry);
        for _ in 0..4 {
            sp = sp.sub(1);
            sp.write(0);
        }
        sp as u32
    }

    /// Create a task that will start in `entry`. The stack comes from the
    /// kernel heap; `None` when the pool or the heap is exhausted.
    pub fn create(entry: extern "C" fn()) -> Option<TaskId> {
        let stack = heap::kmalloc(STACK_SIZE)?.as_ptr();
        let context = unsafe {
            (stack as *mut u32).write(STACK_CANARY);
            let esp = build_initial_frame(stack, entry as usize as u32, task_exit as usize as u32);
            Context::initial(task_trampoline as usize as u32, esp)
        };
        let admitted = with_table(|table| table.admit(context, stack));
        match admitted {
            Some(slot) => {
                log::debug!("task: created in slot {}", slot);
                Some(slot)
            }
            None => {
                heap::kfree(stack);
                log::warn!("task: pool full, create refused");
                None
            }
        }
    }

    /// Scheduler entry: audit canaries, reap terminated tasks, pick the next
    /// ready task, and switch to it. Returns without switching when the
    /// current task is the only runnable one.
    pub fn task_switch() {
        let pending = with_table(|table| {
            if let Err(id) = table.audit_canaries() {
                panic!("stack canary corrupted in task #{}", id);
            }
            for stack in table.reap_terminated().iter().flatten() {
                heap::kfree(*stack);
            }
            table.choose().map(|(prev, next)| {
                (
                    table.context_ptr(prev),
                    table.context_ptr(next) as *const Context,
                )
            })
        });
        if let Some((prev, next)) = pending {
            // SAFETY: both contexts live in the static pool; `next` was
            // either saved by an earlier switch or freshly built by create.
            unsafe { context_switch(prev, next) };
        }
    }

    /// Voluntarily give up the CPU.
    pub fn yield_now() {
        task_switch();
    }

    /// Sleep for at least `ticks` timer ticks.
    pub fn sleep(ticks: u32) {
        let should_yield = with_table(|table| table.sleep_current(ticks));
        if should_yield {
            task_switch();
        }
    }

    /// Terminate the current task. The descriptor and stack are reclaimed by
    /// the next scheduler pass, which runs on another task's stack.
    pub fn exit() -> ! {
        with_table(|table| table.terminate_current());
        task_switch();
        // A terminated task is never rescheduled; this spins only if exit
        // was called before any other task existed.
        loop {
            cpu::halt();
        }
    }

    /// Return target for task entry functions.
    pub extern "C" fn task_exit() {
        exit();
    }
}

#[cfg(target_arch = "x86")]
pub use switching::{create, exit, sleep, task_switch, yield_now};
