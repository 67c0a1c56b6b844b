//! Interrupt dispatch wiring
//!
//! Thin naked stubs front every vector: they save the caller-visible
//! register state, call the matching Rust handler, and `iretd`. Each
//! accepted hardware IRQ is acknowledged with an EOI, including ones the
//! kernel has no semantic handler for; otherwise the PIC stops delivering.
//!
//! `init` fills all 256 vectors with the fallback stub FIRST and installs
//! the specific vectors afterwards, so nothing can overwrite them before
//! the single `lidt`.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ember_arch::idt::{self, vector, INTERRUPT_GATE, KERNEL_CODE_SELECTOR};
use ember_arch::{pic, port};

const KEYBOARD_DATA_PORT: u16 = 0x60;

/// Ticks between cursor-blink phase flips (~2 Hz at the 100 Hz PIT rate)
const BLINK_INTERVAL_TICKS: u32 = 25;

static TICKS: AtomicU32 = AtomicU32::new(0);
static CURSOR_VISIBLE: AtomicBool = AtomicBool::new(true);
static CURSOR_BLINK_REQUEST: AtomicBool = AtomicBool::new(false);

/// Timer ticks since boot
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Current cursor blink phase
pub fn cursor_visible() -> bool {
    CURSOR_VISIBLE.load(Ordering::Relaxed)
}

/// Consume a pending blink request (set by the timer ISR)
pub fn take_blink_request() -> bool {
    CURSOR_BLINK_REQUEST.swap(false, Ordering::Relaxed)
}

/// Build and load the IDT: fallback everywhere, then the four specific
/// vectors, then `lidt`.
pub fn init() {
    idt::install_all(
        fallback_stub as usize as u32,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE,
    );
    idt::install_vector(
        vector::DOUBLE_FAULT,
        double_fault_stub as usize as u32,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE,
    );
    idt::install_vector(
        vector::PAGE_FAULT,
        page_fault_stub as usize as u32,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE,
    );
    idt::install_vector(
        vector::TIMER,
        timer_stub as usize as u32,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE,
    );
    idt::install_vector(
        vector::KEYBOARD,
        keyboard_stub as usize as u32,
        KERNEL_CODE_SELECTOR,
        INTERRUPT_GATE,
    );
    idt::load();
    log::info!("interrupts: idt loaded, vectors 0x08/0x0e/0x20/0x21 wired");
}

/// IRQ0: bump the tick counter, account sleep time, request a cursor blink
/// every quarter second. Never schedules.
extern "C" fn timer_interrupt() {
    let count = TICKS.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    ember_task::tick();
    if count % BLINK_INTERVAL_TICKS == 0 {
        let visible = !CURSOR_VISIBLE.load(Ordering::Relaxed);
        CURSOR_VISIBLE.store(visible, Ordering::Relaxed);
        CURSOR_BLINK_REQUEST.store(true, Ordering::Relaxed);
    }
    pic::send_eoi(0);
}

/// IRQ1: exactly one read of the keyboard data port, one state-machine step,
/// at most one byte queued. No allocation, no scheduling.
extern "C" fn keyboard_interrupt() {
    let scancode = unsafe { port::inb(KEYBOARD_DATA_PORT) };
    ember_keyboard::handle_scancode(scancode);
    pic::send_eoi(1);
}

/// Any vector without a dedicated handler: acknowledge and return.
extern "C" fn fallback_interrupt() {
    pic::send_eoi_all();
}

/// #PF: CR2 holds the faulting address; the paging layer prints the
/// diagnostic and halts. Fatal.
extern "C" fn page_fault_interrupt(err_code: u32) -> ! {
    ember_mem::paging::page_fault(err_code, ember_arch::cpu::read_cr2())
}

#[unsafe(naked)]
unsafe extern "C" fn timer_stub() {
    core::arch::naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym timer_interrupt,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn keyboard_stub() {
    core::arch::naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym keyboard_interrupt,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn fallback_stub() {
    core::arch::naked_asm!(
        "pushad",
        "call {handler}",
        "popad",
        "iretd",
        handler = sym fallback_interrupt,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn page_fault_stub() {
    core::arch::naked_asm!(
        // The CPU pushed the error code; it sits above the 32-byte pushad
        // frame. The handler never returns, so nothing is restored here.
        "pushad",
        "mov eax, [esp + 32]",
        "push eax",
        "call {handler}",
        handler = sym page_fault_interrupt,
    );
}

#[unsafe(naked)]
unsafe extern "C" fn double_fault_stub() {
    core::arch::naked_asm!(
        "cli",
        "2:",
        "hlt",
        "jmp 2b",
    );
}
