pub mod mediaimport_core;
