// Copyright © 2024 Pathway

mod helpers;

mod test_counting;
mod test_graph;
mod test_timely_memory;
mod test_tracker;
