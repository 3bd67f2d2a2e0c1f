macro_rules! print_header {
    ($msg: expr) => {
        log::info!("==== {} ====", $msg)
    };
}

macro_rules! print_param {
    ($name: expr, $value: expr) => {
        log::info!("{:>24}: {}", $name, $value)
    };
}

/// Evaluate an expression and log how long it took at debug level.
macro_rules! time_function {
    ($name: expr, $body: expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        log::debug!("{:>24}: {:.3} s", $name, start.elapsed().as_secs_f64());
        result
    }};
}

pub(crate) use print_header;
pub(crate) use print_param;
pub(crate) use time_function;

/// Logs completion in 10 % steps.
pub(crate) struct Progress {
    total: usize,
    next_percent: usize,
}

impl Progress {
    pub(crate) fn new(total: usize) -> Self {
        log::info!("{:3}% ...", 0);
        Self {
            total,
            next_percent: 10,
        }
    }

    pub(crate) fn update(&mut self, done: usize) {
        if self.total == 0 {
            return;
        }
        let percent = 100 * done / self.total;
        if percent >= self.next_percent {
            log::info!("{percent:3}% ...");
            while self.next_percent <= percent {
                self.next_percent += 10;
            }
        }
    }
}
