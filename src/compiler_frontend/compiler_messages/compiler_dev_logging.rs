// Extra timer logging
#[macro_export]
#[cfg(feature = "detailed_timers")]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {
        saying::say!($msg, Green #$time.elapsed());
    };
}

#[macro_export]
#[cfg(not(feature = "detailed_timers"))]
macro_rules! timer_log {
    ($time:expr, $msg:expr) => {
        let _ = &$time;
    };
}

// BORROW CHECKER LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_borrow_checker")]
macro_rules! borrow_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_borrow_checker"))]
macro_rules! borrow_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

// ORIGIN TRACKING LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_origins")]
macro_rules! origin_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_origins"))]
macro_rules! origin_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

// DROP INSERTION LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_drops")]
macro_rules! drop_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_drops"))]
macro_rules! drop_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}

// CONVENTION RESOLUTION LOGGING MACROS
#[macro_export]
#[cfg(feature = "show_conventions")]
macro_rules! convention_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}

#[macro_export]
#[cfg(not(feature = "show_conventions"))]
macro_rules! convention_log {
    ($($arg:tt)*) => {
        // Nothing
    };
}
