//! Process Exit and Reaping
//!
//! An exiting process gives back its files, directory and semaphores
//! itself, then becomes a ZOMBIE. Its kernel stack and address space stay
//! allocated until the parent collects it with `wait`, which returns the
//! slot to UNUSED. Children of an exiting process are handed to init.
//!
//! `kill` only sets a flag. The victim exits the next time it passes
//! [`Kernel::checkpoint`], which the trap-return path calls; a sleeping
//! victim is made runnable so it gets there.

use core::task::Poll;

use crate::kernel::Kernel;
use crate::ke::bugcheck::{codes, ke_bug_check_ex};
use crate::ke::wait::Channel;
use crate::param::{NOFILE, NPROC};
use crate::platform::{CpuId, Platform};
use super::{Pid, ProcError, ProcFlags, ProcState};

// ============================================================================
// Exit and Reaping
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Terminate the calling process
    ///
    /// The process is a ZOMBIE and no longer owns the CPU when this
    /// returns; the caller must not run it any further.
    pub fn exit(&self, cpu: CpuId) {
        let slot = self.current_slot(cpu);

        let (pid, ofile, cwd) = {
            let mut table = self.lock_ptable(cpu);
            if table.init_slot() == Some(slot) {
                ke_bug_check_ex(codes::INIT_EXITING, table.proc(slot).pid as u64, "init exiting");
            }
            let p = table.proc_mut(slot);
            let ofile = core::mem::replace(&mut p.ofile, [None; NOFILE]);
            (p.pid, ofile, p.cwd.take())
        };

        for file in ofile.into_iter().flatten() {
            self.platform().file_close(file);
        }
        if let Some(inode) = cwd {
            self.platform().inode_put(inode);
        }
        self.release_semaphores(cpu, slot);

        let mut table = self.lock_ptable(cpu);

        // Parent might be sleeping in wait().
        if let Some(parent) = table.proc(slot).parent {
            let parent_pid = table.proc(parent).pid;
            table.wakeup1(Channel::Process(parent_pid));
        }

        // Pass abandoned children to init.
        let init = table.init_slot();
        let init_pid = init.map(|i| table.proc(i).pid);
        for child in 0..NPROC {
            let c = table.proc(child);
            if c.state == ProcState::Unused || c.parent != Some(slot) {
                continue;
            }
            let zombie = c.state == ProcState::Zombie;
            table.proc_mut(child).parent = init;
            if let (true, Some(init_pid)) = (zombie, init_pid) {
                table.wakeup1(Channel::Process(init_pid));
            }
        }

        table.proc_mut(slot).state = ProcState::Zombie;
        log::debug!("pid {} exited", pid);
        self.sched(cpu, &mut table);
    }

    /// Wait for a child to exit; returns its pid
    ///
    /// Fails at once if the caller has no children or was killed.
    /// `Poll::Pending` means the caller sleeps until a child exits.
    pub fn wait(&self, cpu: CpuId) -> Poll<Result<Pid, ProcError>> {
        let mut table = self.lock_ptable(cpu);
        let slot = table.myproc(cpu);

        let mut have_kids = false;
        for child in 0..NPROC {
            let c = table.proc(child);
            if c.state == ProcState::Unused || c.parent != Some(slot) {
                continue;
            }
            have_kids = true;
            if c.state != ProcState::Zombie {
                continue;
            }

            let (pid, kstack, pgdir) = (c.pid, c.kstack, c.pgdir);
            table.release(child);
            drop(table);

            if let Some(kstack) = kstack {
                self.platform().free_kstack(kstack);
            }
            if let Some(pgdir) = pgdir {
                self.platform().free_space(pgdir);
            }
            log::debug!("pid {} reaped", pid);
            return Poll::Ready(Ok(pid));
        }

        if !have_kids {
            return Poll::Ready(Err(ProcError::NoChildren));
        }
        if table.proc(slot).killed() {
            return Poll::Ready(Err(ProcError::Killed));
        }

        let pid = table.proc(slot).pid;
        self.sleep_locked(cpu, &mut table, Channel::Process(pid));
        Poll::Pending
    }
}

// ============================================================================
// Kill
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Mark process `pid` killed
    pub fn kill(&self, cpu: CpuId, pid: Pid) -> Result<(), ProcError> {
        let mut table = self.lock_ptable(cpu);
        let slot = table.find(pid).ok_or(ProcError::NotFound)?;

        let p = table.proc_mut(slot);
        p.flags.insert(ProcFlags::KILLED);
        if p.state == ProcState::Sleeping {
            // Wake without the sleep bonus.
            p.chan = None;
            table.enqueue(slot);
        }
        log::debug!("pid {} killed", pid);
        Ok(())
    }

    /// Has the process on `cpu` been killed?
    pub fn killed(&self, cpu: CpuId) -> bool {
        let table = self.lock_ptable(cpu);
        let slot = table.myproc(cpu);
        table.proc(slot).killed()
    }

    /// Safe point on the way back to user mode
    ///
    /// A killed process exits here and `Poll::Pending` is returned.
    pub fn checkpoint(&self, cpu: CpuId) -> Poll<()> {
        if self.killed(cpu) {
            self.exit(cpu);
            return Poll::Pending;
        }
        Poll::Ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{FileRef, InodeRef};
    use crate::testing::{boot, fork_from_init, run_next, state_of};

    #[test]
    fn test_wait_without_children_fails() {
        let kernel = boot();
        run_next(&kernel, 0, |k, cpu, _| {
            assert_eq!(k.wait(cpu), Poll::Ready(Err(ProcError::NoChildren)));
            k.yield_cpu(cpu);
        });
    }

    #[test]
    fn test_exit_then_wait_reaps_once() {
        let kernel = boot();
        let child = fork_from_init(&kernel);

        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, child);
            k.exit(cpu);
        });
        assert_eq!(state_of(&kernel, child), ProcState::Zombie);
        assert_eq!(kernel.platform().live_kstacks(), 2);

        run_next(&kernel, 0, |k, cpu, _| {
            assert_eq!(k.wait(cpu), Poll::Ready(Ok(child)));
            assert_eq!(k.wait(cpu), Poll::Ready(Err(ProcError::NoChildren)));
            k.yield_cpu(cpu);
        });
        assert_eq!(kernel.lock_ptable(0).find(child), None);
        assert_eq!(kernel.platform().live_kstacks(), 1);
        assert_eq!(kernel.platform().live_spaces(), 1);
    }

    #[test]
    fn test_wait_sleeps_until_child_exits() {
        let kernel = boot();
        let child = fork_from_init(&kernel);

        // child runs first (level 0) and yields down to level 1
        run_next(&kernel, 0, |k, cpu, _| k.yield_cpu(cpu));
        // init, also at level 1 and older, waits
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, 1);
            assert_eq!(k.wait(cpu), Poll::Pending);
        });
        assert_eq!(state_of(&kernel, 1), ProcState::Sleeping);

        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, child);
            k.exit(cpu);
        });
        assert_eq!(state_of(&kernel, 1), ProcState::Runnable);

        run_next(&kernel, 0, |k, cpu, _| {
            assert_eq!(k.wait(cpu), Poll::Ready(Ok(child)));
            k.yield_cpu(cpu);
        });
    }

    #[test]
    fn test_exit_reparents_to_init() {
        let kernel = boot();
        let child = fork_from_init(&kernel);
        let mut grandchild = 0;

        run_next(&kernel, 0, |k, cpu, _| {
            grandchild = k.fork(cpu).unwrap();
            k.exit(cpu);
        });
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, grandchild);
            k.exit(cpu);
        });

        let table = kernel.lock_ptable(0);
        let g = table.find(grandchild).unwrap();
        assert_eq!(table.proc(g).parent, table.init_slot());
        assert_eq!(table.proc(table.find(child).unwrap()).state, ProcState::Zombie);
        drop(table);

        let mut reaped = std::vec::Vec::new();
        run_next(&kernel, 0, |k, cpu, _| {
            while let Poll::Ready(Ok(pid)) = k.wait(cpu) {
                reaped.push(pid);
            }
            k.yield_cpu(cpu);
        });
        reaped.sort();
        assert_eq!(reaped, [child, grandchild]);
    }

    #[test]
    fn test_exit_closes_files_and_releases_semaphores() {
        let kernel = boot();
        let mut sem = 0;
        let child = {
            let mut child = 0;
            run_next(&kernel, 0, |k, cpu, _| {
                sem = k.semget(cpu, crate::ke::semaphore::SEM_NEW, 0).unwrap();
                child = k.fork(cpu).unwrap();
                k.yield_cpu(cpu);
            });
            child
        };
        {
            let mut table = kernel.lock_ptable(0);
            let slot = table.find(child).unwrap();
            table.proc_mut(slot).ofile[0] = Some(FileRef(3));
            table.proc_mut(slot).ofile[5] = Some(FileRef(4));
        }
        assert_eq!(kernel.semstat(0, sem).unwrap().refs, 2);

        run_next(&kernel, 0, |k, cpu, _| k.exit(cpu));

        let platform = kernel.platform();
        assert_eq!(platform.file_closes(), 2);
        assert_eq!(platform.inode_refs(), 1);
        assert_eq!(kernel.semstat(0, sem).unwrap().refs, 1);
        let table = kernel.lock_ptable(0);
        let z = table.proc(table.find(child).unwrap());
        assert_eq!(z.ofile, [None; NOFILE]);
        assert_eq!(z.cwd, None::<InodeRef>);
    }

    #[test]
    #[should_panic(expected = "INIT_EXITING")]
    fn test_init_exit_is_fatal() {
        let kernel = boot();
        run_next(&kernel, 0, |k, cpu, _| k.exit(cpu));
    }

    #[test]
    fn test_kill_unknown_pid() {
        let kernel = boot();
        assert_eq!(kernel.kill(0, 42), Err(ProcError::NotFound));
    }

    #[test]
    fn test_kill_wakes_sleeper_without_bonus() {
        let kernel = boot();
        let child = fork_from_init(&kernel);
        run_next(&kernel, 0, |k, cpu, _| {
            k.nice(cpu, 2).unwrap();
            let mut table = k.lock_ptable(cpu);
            k.sleep_locked(cpu, &mut table, Channel::Address(1));
        });

        kernel.kill(0, child).unwrap();
        assert_eq!(state_of(&kernel, child), ProcState::Runnable);
        assert_eq!(crate::testing::level_of(&kernel, child), 2);

        // it exits at its next checkpoint instead of running on
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, 1);
            k.yield_cpu(cpu);
        });
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, child);
            assert_eq!(k.checkpoint(cpu), Poll::Pending);
        });
        assert_eq!(state_of(&kernel, child), ProcState::Zombie);
    }

    #[test]
    fn test_killed_waiter_fails() {
        let kernel = boot();
        let child = fork_from_init(&kernel);
        run_next(&kernel, 0, |k, cpu, _| k.yield_cpu(cpu));
        run_next(&kernel, 0, |k, cpu, _| {
            assert_eq!(k.wait(cpu), Poll::Pending);
        });
        kernel.kill(0, 1).unwrap();
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, child);
            k.yield_cpu(cpu);
        });
        run_next(&kernel, 0, |k, cpu, pid| {
            assert_eq!(pid, 1);
            assert_eq!(k.wait(cpu), Poll::Ready(Err(ProcError::Killed)));
            k.yield_cpu(cpu);
        });
        assert_eq!(state_of(&kernel, child), ProcState::Runnable);
    }
}
