// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod event;
mod lexer;
mod masker;
mod parser;
