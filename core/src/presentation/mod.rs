// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod mcp;
