//! Bootstrap
//!
//! `kernel_main` sequences subsystem initialization in dependency order,
//! wires the interrupt vectors, creates the initial tasks, and yields to the
//! scheduler. The very first context switch saves the boot continuation into
//! the idle task's slot, so the loop at the bottom of this function IS the
//! idle task from then on.

use ember_arch::{cpu, pic, pit};
use ember_mem::{heap, paging, pmm};

use crate::{interrupts, logger, shell};

pub fn kernel_main() -> ! {
    cpu::disable_interrupts();

    {
        let mut vga = ember_console::console();
        vga.clear();
        vga.print_line("EmberOS 0.1.0 (cooperative x86 kernel)", 0);
        vga.print_line("Type 'help' for commands.", 1);
    }

    logger::init();
    log::info!("ember: booting");

    pic::remap(
        pic::PIC1_OFFSET,
        pic::PIC2_OFFSET,
        pic::MASTER_MASK_TIMER_KEYBOARD,
        pic::SLAVE_MASK_ALL,
    );
    // SAFETY: called once, before any allocation, over the reserved arena.
    unsafe {
        heap::init();
    }
    pmm::init();
    paging::init();
    interrupts::init();
    pit::init_100hz();
    ember_keyboard::init();
    ember_task::init();

    cpu::enable_interrupts();

    if ember_task::create(idle_task).is_none() {
        log::error!("ember: could not create idle task");
    }
    if ember_task::create(shell::shell_task).is_none() {
        log::error!("ember: could not create shell task");
    }
    if ember_task::create(sleeper_task).is_none() {
        log::error!("ember: could not create sleeper task");
    }

    log::info!("ember: entering scheduler");
    ember_task::task_switch();

    // Resumes here whenever the scheduler picks the idle slot.
    loop {
        cpu::halt();
        ember_task::yield_now();
    }
}

/// Idle task entry: wait for an interrupt, then give everyone else a turn.
extern "C" fn idle_task() {
    loop {
        cpu::halt();
        ember_task::yield_now();
    }
}

/// Exercises the sleep path: alternates two status lines on a ~1 s period.
extern "C" fn sleeper_task() {
    const ROW: usize = 18;
    loop {
        ember_console::print_line("sleeper: sleeping for 100 ticks", ROW);
        ember_task::sleep(100);
        ember_console::print_line("sleeper: awake", ROW + 1);
        ember_task::sleep(100);
        {
            let mut vga = ember_console::console();
            vga.clear_row(ROW);
            vga.clear_row(ROW + 1);
        }
        ember_task::yield_now();
    }
}
