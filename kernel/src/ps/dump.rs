//! Process Listings
//!
//! Console dumps of the process table and the priority levels, for
//! debugging from a user program or the kernel monitor.

use crate::kernel::Kernel;
use crate::param::PLEVELS;
use crate::platform::{Console, CpuId, Platform};
use crate::{cprint, cprintln};
use super::{ProcState, ProcTable};

fn print_procs<C: Console + ?Sized>(console: &C, table: &ProcTable) {
    for p in table.procs.iter().filter(|p| p.state != ProcState::Unused) {
        cprint!(
            console,
            "- {}   {}   {}   level: {} \n",
            p.pid,
            p.state.name(),
            p.name,
            p.level
        );
    }
    cprintln!(console);
}

fn print_level<C: Console + ?Sized>(console: &C, table: &ProcTable, level: usize) {
    if table.is_level_empty(level) {
        cprintln!(console, " LEVEL {}: EMPTY", level);
        return;
    }

    cprintln!(console, " LEVEL {}: ", level);
    for slot in table.level_slots(level) {
        let p = table.proc(slot);
        cprintln!(console, "            > {}   {}   {} ", p.pid, p.state.name(), p.name);
    }
}

impl<P: Platform> Kernel<P> {
    /// Print one line per process in the table
    pub fn procstat(&self, cpu: CpuId) {
        let table = self.lock_ptable(cpu);
        print_procs(self.platform(), &table);
    }

    /// Print the process table followed by every priority level
    pub fn plevelstat(&self, cpu: CpuId) {
        let console = self.platform();
        cprintln!(console, "\n----------- BEGIN: List processes ----------\n");

        {
            let table = self.lock_ptable(cpu);
            print_procs(console, &table);

            cprintln!(console, "\n ===========  Priority table  ===========");
            for level in 0..PLEVELS {
                cprintln!(console);
                print_level(console, &table, level);
            }
        }

        cprintln!(console, "\n----------- END: List processes ----------");
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{boot, fork_from_init, run_next};

    #[test]
    fn test_procstat_lists_live_processes() {
        let kernel = boot();
        let _child = fork_from_init(&kernel);
        kernel.procstat(0);

        assert_eq!(
            kernel.platform().console_output(),
            "- 1   RUNNABLE   initcode   level: 1 \n\
             - 2   RUNNABLE   initcode   level: 0 \n\
             \n"
        );
    }

    #[test]
    fn test_plevelstat_layout() {
        let kernel = boot();
        let child = fork_from_init(&kernel);
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, child);
            k.plevelstat(cpu);
            k.yield_cpu(cpu);
        });

        let expected = "\n----------- BEGIN: List processes ----------\n\n\
                        - 1   RUNNABLE   initcode   level: 1 \n\
                        - 2   running    initcode   level: 0 \n\
                        \n\
                        \n ===========  Priority table  ===========\n\
                        \n LEVEL 0: EMPTY\n\
                        \n LEVEL 1: \n            > 1   RUNNABLE   initcode \n\
                        \n LEVEL 2: EMPTY\n\
                        \n LEVEL 3: EMPTY\n\
                        \n----------- END: List processes ----------\n";
        assert_eq!(kernel.platform().console_output(), expected);
    }
}
