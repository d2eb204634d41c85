// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::error::Error;

/// Defines the sketch families understood by this crate.
///
/// A family defines a set of classes that share fundamental algorithms and behaviors. The classes
/// within a family may still differ by how they are stored and accessed.
pub(crate) struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
    /// The minimum preamble size for this family in longs (8-bytes integer).
    pub min_pre_longs: u8,
    /// The maximum preamble size for this family in longs (8-bytes integer).
    pub max_pre_longs: u8,
}

impl Family {
    /// The compact form of the Theta family. Shared by every serial version.
    pub const COMPACT_THETA: Family = Family {
        id: 3,
        name: "COMPACT",
        min_pre_longs: 1,
        max_pre_longs: 3,
    };
}

impl Family {
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }

    pub fn validate_pre_longs(&self, pre_longs: u8) -> Result<(), Error> {
        if (self.min_pre_longs..=self.max_pre_longs).contains(&pre_longs) {
            Ok(())
        } else {
            let expected: Vec<u8> = (self.min_pre_longs..=self.max_pre_longs).collect();
            Err(Error::invalid_preamble_longs(&expected, pre_longs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_theta_family() {
        assert!(Family::COMPACT_THETA.validate_id(3).is_ok());
        let err = Family::COMPACT_THETA.validate_id(7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);
        assert!(err.message().contains("COMPACT"));

        assert!(Family::COMPACT_THETA.validate_pre_longs(1).is_ok());
        assert!(Family::COMPACT_THETA.validate_pre_longs(3).is_ok());
        assert!(Family::COMPACT_THETA.validate_pre_longs(0).is_err());
        assert!(Family::COMPACT_THETA.validate_pre_longs(4).is_err());
    }
}
