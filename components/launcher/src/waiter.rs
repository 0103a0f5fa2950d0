// Copyright (c) 2017 Chef Software Inc. and/or applicable contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The one-shot completion signal used by `Load`/`Stop`/`Rerun` when
//! `wait = true`. The source uses a raw binary semaphore plus a
//! heap-allocated status integer; a `sync_channel(1)` pair is the
//! language-neutral substitute named in `SPEC_FULL.md` §9.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

pub struct WaiterTx<T>(SyncSender<T>);

pub struct WaiterRx<T>(Receiver<T>);

pub fn waiter<T>() -> (WaiterTx<T>, WaiterRx<T>) {
    let (tx, rx) = sync_channel(1);
    (WaiterTx(tx), WaiterRx(rx))
}

impl<T> WaiterTx<T> {
    /// Release the waiter exactly once. The receiving end may already have
    /// given up (e.g. the client disconnected while waiting); that's not an
    /// error here, the value is simply dropped.
    pub fn signal(self, value: T) {
        let _ = self.0.send(value);
    }
}

impl<T> WaiterRx<T> {
    /// Block for the one release this channel will ever carry.
    pub fn wait(self) -> Option<T> {
        self.0.recv().ok()
    }
}
