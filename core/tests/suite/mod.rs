mod end_to_end;
mod support;
mod threshold_monitor;
mod write_through;
