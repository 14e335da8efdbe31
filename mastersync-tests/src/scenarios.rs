//! Reusable host sets and seeds for election tests.

/// Standard candidate sets.
pub mod clusters {
    /// Three hosts, deliberately listed out of rank order.
    pub const THREE_HOSTS: &[&str] = &["host3", "host1", "host2"];

    /// Five hosts in rank order.
    pub const FIVE_HOSTS: &[&str] = &["node1", "node2", "node3", "node4", "node5"];
}

/// Seeds for reproducible randomized tests.
pub mod seeds {
    /// Fixed seeds run on every test invocation.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of generated cases per seed.
    pub const CASES_PER_SEED: usize = 50;
}
