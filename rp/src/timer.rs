use crate::regs::{reg, Block};
use rmii_mac::hal::Clock;

const TIMERAWH: usize = 0x24;
const TIMERAWL: usize = 0x28;

/// The free-running 1 MHz system timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timer;

impl Timer {
    pub fn new() -> Timer {
        Timer
    }
}

impl Clock for Timer {
    fn now_us(&self) -> u64 {
        let high = reg(Block::Timer, TIMERAWH);
        let low = reg(Block::Timer, TIMERAWL);
        loop {
            let before = high.read();
            let low_bits = low.read();
            // Retry if the low half wrapped in between.
            if high.read() == before {
                return (before as u64) << 32 | low_bits as u64;
            }
        }
    }

    fn delay_us(&self, us: u32) {
        let deadline = self.now_us() + us as u64;
        while self.now_us() < deadline {
            core::hint::spin_loop();
        }
    }
}
