// Copyright 2025 eraflo
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

//! Ready-made folds for [`Bus::broadcast_result_with`](crate::Bus::broadcast_result_with)
//! and [`Bus::event_result_with`](crate::Bus::event_result_with).
//!
//! Each fold takes the accumulator and one handler's return value. The
//! accumulator starts at whatever the caller seeded it with.

use std::ops::AddAssign;

/// Keeps the most recent value.
pub fn last<T>(acc: &mut T, value: T) {
    *acc = value;
}

/// Logical OR: `true` once any handler answered `true`.
pub fn any(acc: &mut bool, value: bool) {
    *acc |= value;
}

/// Logical AND: `false` once any handler answered `false`.
pub fn all(acc: &mut bool, value: bool) {
    *acc &= value;
}

/// Keeps the first non-empty answer.
pub fn first_some<T>(acc: &mut Option<T>, value: Option<T>) {
    if acc.is_none() {
        *acc = value;
    }
}

/// Gathers every answer in call order.
pub fn collect<T>(acc: &mut Vec<T>, value: T) {
    acc.push(value);
}

/// Adds every answer to the accumulator.
pub fn sum<T: AddAssign>(acc: &mut T, value: T) {
    *acc += value;
}
