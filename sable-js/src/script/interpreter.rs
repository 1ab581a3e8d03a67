//! Tree-walking interpreter.
//!
//! Runs a parsed [`Program`] against a session. All heap access goes
//! through the session's property store and function bridge, so guest code
//! and host code see the same objects. Guest functions are registered with
//! the bridge as [`ScriptFunction`]s and re-enter the interpreter when called.

use std::fmt;
use std::sync::Arc;

use crate::builtins::math::js_pow;
use crate::coerce::{self, Hint};
use crate::engine::GuestCode;
use crate::error::{Result, VmError};
use crate::exception::ErrorKind;
use crate::session::VmSession;
use crate::value::{PropertyKey, Value};

use super::ast::*;
use super::scope::{Assign, Scope};

/// Statement completion.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Normal completion, with the value of the last expression statement.
    Normal(Option<Value>),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// What a loop does after one run of its body.
enum LoopStep {
    Next,
    Exit(Completion),
}

fn loop_step(completion: Completion, labels: &[String]) -> LoopStep {
    match completion {
        Completion::Normal(_) | Completion::Continue(None) => LoopStep::Next,
        Completion::Continue(Some(ref label)) if labels.contains(label) => LoopStep::Next,
        Completion::Break(None) => LoopStep::Exit(Completion::Normal(None)),
        Completion::Break(Some(ref label)) if labels.contains(label) => {
            LoopStep::Exit(Completion::Normal(None))
        }
        other => LoopStep::Exit(other),
    }
}

/// Assignable location.
enum Reference {
    Binding(String),
    Member(Value, PropertyKey),
}

pub struct Interpreter<'vm> {
    vm: &'vm mut VmSession,
    /// Innermost lexical scope; `None` at the top level of a program.
    scope: Option<Scope>,
    this: Value,
}

/// Run a program at the top level of the session.
///
/// `var` and function declarations become properties of the global object.
pub fn run_program(vm: &mut VmSession, program: &Program) -> Result<Value> {
    let global = vm.intrinsics.global;
    for name in &program.var_names {
        let key = PropertyKey::from(name.as_str());
        if vm.find_property(global, &key)?.is_none() {
            vm.put(global, key, Value::Undefined)?;
        }
    }

    let this = vm.get_global()?;
    let mut interp = Interpreter::new(vm, None, this);
    interp.hoist_functions(&program.body)?;

    let mut last = Value::Undefined;
    for statement in &program.body {
        match interp.execute_statement(statement)? {
            Completion::Normal(Some(value)) => last = value,
            Completion::Normal(None) => {}
            Completion::Return(value) => return Ok(value),
            Completion::Break(_) => return Err(interp.syntax_error("Illegal break statement")),
            Completion::Continue(_) => {
                return Err(interp.syntax_error("Illegal continue statement"))
            }
        }
    }
    Ok(last)
}

impl<'vm> Interpreter<'vm> {
    pub fn new(vm: &'vm mut VmSession, scope: Option<Scope>, this: Value) -> Self {
        Interpreter { vm, scope, this }
    }

    /// Bind the function declarations of a statement list before it runs.
    fn hoist_functions(&mut self, body: &[Statement]) -> Result<()> {
        for statement in body {
            if let Statement::Function(node) = statement {
                let function = self.create_function(node, None, false)?;
                self.assign_binding(node.name(), function)?;
            }
        }
        Ok(())
    }

    /// Run `f` with `scope` as the innermost scope, restoring the old one.
    fn in_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = std::mem::replace(&mut self.scope, Some(scope));
        let result = f(self);
        self.scope = saved;
        result
    }

    fn child_scope(&self) -> Scope {
        Scope::new(self.scope.clone())
    }

    // ---- statements ----

    fn execute_statements(&mut self, body: &[Statement]) -> Result<Completion> {
        let mut last = None;
        for statement in body {
            match self.execute_statement(statement)? {
                Completion::Normal(value) => {
                    if value.is_some() {
                        last = value;
                    }
                }
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn execute_statement(&mut self, statement: &Statement) -> Result<Completion> {
        match statement {
            Statement::Empty(_) | Statement::Debugger(_) | Statement::Function(_) => {
                Ok(Completion::Normal(None))
            }
            Statement::Expression(stmt) => {
                let value = self.evaluate(&stmt.expression)?;
                Ok(Completion::Normal(Some(value)))
            }
            Statement::Block(block) => self.execute_block(block),
            Statement::Variable(decl) => {
                self.execute_variable_declaration(decl)?;
                Ok(Completion::Normal(None))
            }
            Statement::If(stmt) => self.execute_if(stmt),
            Statement::Break(jump) => Ok(Completion::Break(jump.label.clone())),
            Statement::Continue(jump) => Ok(Completion::Continue(jump.label.clone())),
            Statement::Return(stmt) => {
                let value = match &stmt.argument {
                    Some(argument) => self.evaluate(argument)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::Throw(stmt) => {
                let value = self.evaluate(&stmt.argument)?;
                Err(self.vm.throw(value))
            }
            Statement::Try(stmt) => self.execute_try(stmt),
            Statement::Labeled(stmt) => self.execute_labeled(stmt),
            Statement::For(_)
            | Statement::ForIn(_)
            | Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::Switch(_) => self.execute_breakable(statement, &[]),
        }
    }

    /// Loops and `switch`, which consume unlabeled `break` and any
    /// `break`/`continue` naming one of `labels`.
    fn execute_breakable(&mut self, statement: &Statement, labels: &[String]) -> Result<Completion> {
        match statement {
            Statement::For(stmt) => self.execute_for(stmt, labels),
            Statement::ForIn(stmt) => self.execute_for_in(stmt, labels),
            Statement::While(stmt) => self.execute_while(stmt, labels),
            Statement::DoWhile(stmt) => self.execute_do_while(stmt, labels),
            Statement::Switch(stmt) => self.execute_switch(stmt),
            other => self.execute_statement(other),
        }
    }

    fn execute_block(&mut self, block: &BlockStmt) -> Result<Completion> {
        if block.body.iter().any(Statement::is_lexical_declaration) {
            let scope = self.child_scope();
            self.in_scope(scope, |this| {
                this.hoist_functions(&block.body)?;
                this.execute_statements(&block.body)
            })
        } else {
            self.hoist_functions(&block.body)?;
            self.execute_statements(&block.body)
        }
    }

    fn execute_variable_declaration(&mut self, decl: &VariableDecl) -> Result<()> {
        for declarator in &decl.declarations {
            let name = declarator.id.name.as_str();
            match decl.kind {
                VariableKind::Var => {
                    if let Some(init) = &declarator.init {
                        let value = self.evaluate_named(init, name)?;
                        self.assign_binding(name, value)?;
                    }
                }
                VariableKind::Let | VariableKind::Const => {
                    let value = match &declarator.init {
                        Some(init) => self.evaluate_named(init, name)?,
                        None => Value::Undefined,
                    };
                    self.declare_lexical(name, value, decl.kind == VariableKind::Let)?;
                }
            }
        }
        Ok(())
    }

    fn execute_if(&mut self, stmt: &IfStmt) -> Result<Completion> {
        if self.evaluate(&stmt.test)?.to_boolean() {
            self.execute_statement(&stmt.consequent)
        } else if let Some(alternate) = &stmt.alternate {
            self.execute_statement(alternate)
        } else {
            Ok(Completion::Normal(None))
        }
    }

    fn execute_for(&mut self, stmt: &ForStmt, labels: &[String]) -> Result<Completion> {
        let lexical = matches!(&stmt.init, Some(ForInit::Variable(decl)) if decl.kind != VariableKind::Var);
        if lexical {
            let scope = self.child_scope();
            self.in_scope(scope, |this| this.run_for(stmt, labels, true))
        } else {
            self.run_for(stmt, labels, false)
        }
    }

    /// With `per_iteration`, each iteration gets a fresh copy of the loop
    /// bindings so closures capture that iteration's values.
    fn run_for(&mut self, stmt: &ForStmt, labels: &[String], per_iteration: bool) -> Result<Completion> {
        match &stmt.init {
            Some(ForInit::Variable(decl)) => self.execute_variable_declaration(decl)?,
            Some(ForInit::Expression(expr)) => {
                self.evaluate(expr)?;
            }
            None => {}
        }
        loop {
            if let Some(test) = &stmt.test {
                if !self.evaluate(test)?.to_boolean() {
                    break;
                }
            }
            let completion = self.execute_statement(&stmt.body)?;
            if let LoopStep::Exit(completion) = loop_step(completion, labels) {
                return Ok(completion);
            }
            if per_iteration {
                self.scope = self.scope.as_ref().map(Scope::fork);
            }
            if let Some(update) = &stmt.update {
                self.evaluate(update)?;
            }
        }
        Ok(Completion::Normal(None))
    }

    fn execute_for_in(&mut self, stmt: &ForInStmt, labels: &[String]) -> Result<Completion> {
        let object = self.evaluate(&stmt.right)?;
        let (slot, keys) = match &object {
            Value::Object(obj) => {
                let slot = self.vm.resolve(obj)?;
                let keys = self.vm.enumerable_keys(slot)?;
                (Some(slot), keys)
            }
            Value::String(s) => {
                let len = s.encode_utf16().count();
                (None, (0..len).map(PropertyKey::from).collect())
            }
            _ => (None, Vec::new()),
        };

        for key in keys {
            // Keys deleted by an earlier iteration are skipped.
            if let Some(slot) = slot {
                if self.vm.find_property(slot, &key)?.is_none() {
                    continue;
                }
            }
            let value = Value::String(key.to_string());
            let completion = match &stmt.left {
                ForInLeft::Declaration(VariableKind::Var, id) => {
                    self.assign_binding(&id.name, value)?;
                    self.execute_statement(&stmt.body)?
                }
                ForInLeft::Declaration(kind, id) => {
                    let scope = self.child_scope();
                    scope.declare(&id.name, value, *kind == VariableKind::Let);
                    self.in_scope(scope, |this| this.execute_statement(&stmt.body))?
                }
                ForInLeft::Target(target) => {
                    let reference = self.reference(target)?;
                    self.put_reference(reference, value)?;
                    self.execute_statement(&stmt.body)?
                }
            };
            if let LoopStep::Exit(completion) = loop_step(completion, labels) {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal(None))
    }

    fn execute_while(&mut self, stmt: &WhileStmt, labels: &[String]) -> Result<Completion> {
        while self.evaluate(&stmt.test)?.to_boolean() {
            let completion = self.execute_statement(&stmt.body)?;
            if let LoopStep::Exit(completion) = loop_step(completion, labels) {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal(None))
    }

    fn execute_do_while(&mut self, stmt: &DoWhileStmt, labels: &[String]) -> Result<Completion> {
        loop {
            let completion = self.execute_statement(&stmt.body)?;
            if let LoopStep::Exit(completion) = loop_step(completion, labels) {
                return Ok(completion);
            }
            if !self.evaluate(&stmt.test)?.to_boolean() {
                return Ok(Completion::Normal(None));
            }
        }
    }

    fn execute_switch(&mut self, stmt: &SwitchStmt) -> Result<Completion> {
        let value = self.evaluate(&stmt.discriminant)?;
        let lexical = stmt
            .cases
            .iter()
            .any(|case| case.consequent.iter().any(Statement::is_lexical_declaration));
        if lexical {
            let scope = self.child_scope();
            self.in_scope(scope, |this| this.run_switch(stmt, &value))
        } else {
            self.run_switch(stmt, &value)
        }
    }

    fn run_switch(&mut self, stmt: &SwitchStmt, value: &Value) -> Result<Completion> {
        let mut start = None;
        for (index, case) in stmt.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let candidate = self.evaluate(test)?;
                if coerce::strict_equals(value, &candidate) {
                    start = Some(index);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| stmt.cases.iter().position(|c| c.test.is_none())) else {
            return Ok(Completion::Normal(None));
        };

        for case in &stmt.cases[start..] {
            match self.execute_statements(&case.consequent)? {
                Completion::Normal(_) => {}
                Completion::Break(None) => return Ok(Completion::Normal(None)),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(None))
    }

    fn execute_try(&mut self, stmt: &TryStmt) -> Result<Completion> {
        let mut result = self.execute_block(&stmt.block);

        if let Some(handler) = &stmt.handler {
            if let Err(err) = result {
                result = if err.is_catchable() {
                    match self.vm.into_guest_error(err) {
                        VmError::Exception(exception) => self.execute_catch(handler, exception.value),
                        other => Err(other),
                    }
                } else {
                    Err(err)
                };
            }
        }

        if let Some(finalizer) = &stmt.finalizer {
            // An abrupt `finally` overrides whatever the try/catch produced.
            match self.execute_block(finalizer)? {
                Completion::Normal(_) => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    fn execute_catch(&mut self, handler: &CatchClause, value: Value) -> Result<Completion> {
        let scope = self.child_scope();
        if let Some(param) = &handler.param {
            scope.declare(&param.name, value, true);
        }
        self.in_scope(scope, |this| this.execute_block(&handler.body))
    }

    fn execute_labeled(&mut self, stmt: &LabeledStmt) -> Result<Completion> {
        let mut labels = vec![stmt.label.clone()];
        let mut body = &*stmt.body;
        while let Statement::Labeled(inner) = body {
            labels.push(inner.label.clone());
            body = &inner.body;
        }
        Ok(match self.execute_breakable(body, &labels)? {
            Completion::Break(Some(label)) if labels.contains(&label) => Completion::Normal(None),
            other => other,
        })
    }

    // ---- bindings ----

    fn lookup_binding(&mut self, name: &str) -> Result<Option<Value>> {
        if let Some(scope) = &self.scope {
            if let Some(value) = scope.lookup(name) {
                return Ok(Some(value));
            }
        }
        let global = self.vm.intrinsics.global;
        self.vm.find_property(global, &PropertyKey::from(name))
    }

    fn read_binding(&mut self, name: &str) -> Result<Value> {
        match self.lookup_binding(name)? {
            Some(value) => Ok(value),
            None => Err(self
                .vm
                .raise(ErrorKind::ReferenceError, format!("{} is not defined", name))),
        }
    }

    /// Assign through the scope chain. Names no scope declares land on the
    /// global object.
    fn assign_binding(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(scope) = &self.scope {
            match scope.assign(name, value.clone()) {
                Assign::Done => return Ok(()),
                Assign::Constant => {
                    return Err(self
                        .vm
                        .raise(ErrorKind::TypeError, "Assignment to constant variable."))
                }
                Assign::Unbound => {}
            }
        }
        let global = self.vm.intrinsics.global;
        self.vm.put(global, PropertyKey::from(name), value)
    }

    /// `let`/`const` binding in the innermost scope, or on the global object
    /// at the top level.
    fn declare_lexical(&mut self, name: &str, value: Value, mutable: bool) -> Result<()> {
        match &self.scope {
            Some(scope) => {
                scope.declare(name, value, mutable);
                Ok(())
            }
            None => {
                let global = self.vm.intrinsics.global;
                self.vm.put(global, PropertyKey::from(name), value)
            }
        }
    }

    fn reference(&mut self, expr: &Expression) -> Result<Reference> {
        match expr {
            Expression::Identifier(id) => Ok(Reference::Binding(id.name.clone())),
            Expression::Member(member) => {
                let base = self.evaluate(&member.object)?;
                let key = self.member_key(&member.property)?;
                Ok(Reference::Member(base, key))
            }
            _ => Err(self.syntax_error("Invalid assignment target")),
        }
    }

    fn get_reference(&mut self, reference: &Reference) -> Result<Value> {
        match reference {
            Reference::Binding(name) => self.read_binding(name),
            Reference::Member(base, key) => self.vm.get_member(base, key),
        }
    }

    fn put_reference(&mut self, reference: Reference, value: Value) -> Result<()> {
        match reference {
            Reference::Binding(name) => self.assign_binding(&name, value),
            Reference::Member(base, key) => self.vm.set_member(&base, key, value),
        }
    }

    // ---- expressions ----

    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Identifier(id) => self.read_binding(&id.name),
            Expression::Literal(literal, _) => Ok(literal_value(literal)),
            Expression::RegExp(re) => self.vm.create_regexp(&re.pattern, &re.flags),
            Expression::Array(array) => self.evaluate_array(array),
            Expression::Object(object) => self.evaluate_object(object),
            Expression::Function(node) => self.create_function(node, None, true),
            Expression::Unary(unary) => self.evaluate_unary(unary),
            Expression::Update(update) => self.evaluate_update(update),
            Expression::Binary(binary) => self.evaluate_binary(binary),
            Expression::Logical(logical) => self.evaluate_logical(logical),
            Expression::Conditional(cond) => self.evaluate_conditional(cond),
            Expression::Assignment(assign) => self.evaluate_assignment(assign),
            Expression::Sequence(seq) => self.evaluate_sequence(seq),
            Expression::Member(member) => self.evaluate_member(member),
            Expression::Call(call) => self.evaluate_call(call),
            Expression::New(new) => self.evaluate_new(new),
            Expression::This(_) => Ok(self.this.clone()),
        }
    }

    /// Evaluate, naming an anonymous function after the binding it is
    /// assigned to.
    fn evaluate_named(&mut self, expr: &Expression, name: &str) -> Result<Value> {
        match expr {
            Expression::Function(node) if node.id.is_none() => {
                self.create_function(node, Some(name), true)
            }
            other => self.evaluate(other),
        }
    }

    fn evaluate_array(&mut self, array: &ArrayExpr) -> Result<Value> {
        let length = u32::try_from(array.elements.len())
            .map_err(|_| self.vm.raise(ErrorKind::RangeError, "Invalid array length"))?;
        let value = self.vm.create_array(length)?;
        let slot = self.vm.object_slot(&value, "build array")?;
        for (index, element) in array.elements.iter().enumerate() {
            if let Some(element) = element {
                let item = self.evaluate(element)?;
                self.vm.put(slot, PropertyKey::from(index), item)?;
            }
        }
        Ok(value)
    }

    fn evaluate_object(&mut self, object: &ObjectExpr) -> Result<Value> {
        let value = self.vm.create_object()?;
        let slot = self.vm.object_slot(&value, "build object")?;
        for property in &object.properties {
            let key = self.member_key(&property.key)?;
            let item = match &key {
                PropertyKey::Name(name) => self.evaluate_named(&property.value, name)?,
                PropertyKey::Index(_) => self.evaluate(&property.value)?,
            };
            if matches!(property.key, PropertyName::Named(ref n) if n == "__proto__") {
                match &item {
                    Value::Object(proto) => {
                        let proto = self.vm.resolve(proto)?;
                        self.vm.link_prototype(slot, Some(proto))?;
                    }
                    Value::Null => self.vm.link_prototype(slot, None)?,
                    _ => {}
                }
                continue;
            }
            self.vm.put(slot, key, item)?;
        }
        Ok(value)
    }

    /// Turn a function node into a guest function value closing over the
    /// current scope. Named function expressions see their own name.
    fn create_function(
        &mut self,
        node: &Arc<FunctionNode>,
        name_hint: Option<&str>,
        is_expression: bool,
    ) -> Result<Value> {
        let name = match (node.name(), name_hint) {
            ("", Some(hint)) => hint,
            (name, _) => name,
        };
        let self_binding = is_expression && !node.is_arrow && node.id.is_some();
        let captured = if self_binding {
            Some(self.child_scope())
        } else {
            self.scope.clone()
        };
        let code = ScriptFunction {
            node: Arc::clone(node),
            scope: captured.clone(),
            lexical_this: node.is_arrow.then(|| self.this.clone()),
        };
        let function = self
            .vm
            .create_guest_function(name, Arc::new(code), !node.is_arrow)?;
        if let (true, Some(scope)) = (self_binding, &captured) {
            scope.declare(node.name(), function.clone(), true);
        }
        Ok(function)
    }

    fn evaluate_unary(&mut self, unary: &UnaryExpr) -> Result<Value> {
        match unary.operator {
            UnaryOp::Typeof => {
                let value = match &*unary.argument {
                    // Undeclared names are "undefined" rather than an error.
                    Expression::Identifier(id) => self.lookup_binding(&id.name)?.unwrap_or_default(),
                    other => self.evaluate(other)?,
                };
                Ok(Value::from(value.type_of()))
            }
            UnaryOp::Delete => self.evaluate_delete(&unary.argument),
            UnaryOp::Void => {
                self.evaluate(&unary.argument)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Not => Ok(Value::Boolean(!self.evaluate(&unary.argument)?.to_boolean())),
            UnaryOp::Minus => {
                let value = self.evaluate(&unary.argument)?;
                Ok(Value::Number(-self.vm.to_number(&value)?))
            }
            UnaryOp::Plus => {
                let value = self.evaluate(&unary.argument)?;
                Ok(Value::Number(self.vm.to_number(&value)?))
            }
            UnaryOp::BitNot => {
                let value = self.evaluate(&unary.argument)?;
                Ok(Value::Number(!self.vm.to_int32(&value)? as f64))
            }
        }
    }

    fn evaluate_delete(&mut self, argument: &Expression) -> Result<Value> {
        match argument {
            Expression::Member(member) => {
                let base = self.evaluate(&member.object)?;
                let key = self.member_key(&member.property)?;
                match &base {
                    Value::Object(obj) => {
                        let slot = self.vm.resolve(obj)?;
                        Ok(Value::Boolean(self.vm.remove_own(slot, &key)?))
                    }
                    Value::Undefined | Value::Null => Err(self.vm.raise(
                        ErrorKind::TypeError,
                        "Cannot convert undefined or null to object",
                    )),
                    _ => Ok(Value::Boolean(true)),
                }
            }
            Expression::Identifier(id) => {
                // Declared bindings cannot be deleted; implicit globals can.
                if self.scope.as_ref().is_some_and(|s| s.lookup(&id.name).is_some()) {
                    return Ok(Value::Boolean(false));
                }
                let global = self.vm.intrinsics.global;
                Ok(Value::Boolean(
                    self.vm.remove_own(global, &PropertyKey::from(id.name.as_str()))?,
                ))
            }
            other => {
                self.evaluate(other)?;
                Ok(Value::Boolean(true))
            }
        }
    }

    fn evaluate_update(&mut self, update: &UpdateExpr) -> Result<Value> {
        let reference = self.reference(&update.argument)?;
        let current = self.get_reference(&reference)?;
        let old = self.vm.to_number(&current)?;
        let new = match update.operator {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        self.put_reference(reference, Value::Number(new))?;
        Ok(Value::Number(if update.prefix { new } else { old }))
    }

    fn evaluate_binary(&mut self, binary: &BinaryExpr) -> Result<Value> {
        let left = self.evaluate(&binary.left)?;
        let right = self.evaluate(&binary.right)?;
        self.binary_op(binary.operator, &left, &right)
    }

    fn binary_op(&mut self, operator: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        let vm = &mut *self.vm;
        let result = match operator {
            BinaryOp::Add => return self.add(left, right),
            BinaryOp::Sub => Value::Number(vm.to_number(left)? - vm.to_number(right)?),
            BinaryOp::Mul => Value::Number(vm.to_number(left)? * vm.to_number(right)?),
            BinaryOp::Div => Value::Number(vm.to_number(left)? / vm.to_number(right)?),
            BinaryOp::Mod => Value::Number(vm.to_number(left)? % vm.to_number(right)?),
            BinaryOp::Exp => Value::Number(js_pow(vm.to_number(left)?, vm.to_number(right)?)),
            BinaryOp::Equal => Value::Boolean(vm.loose_equals(left, right)?),
            BinaryOp::NotEqual => Value::Boolean(!vm.loose_equals(left, right)?),
            BinaryOp::StrictEqual => Value::Boolean(coerce::strict_equals(left, right)),
            BinaryOp::StrictNotEqual => Value::Boolean(!coerce::strict_equals(left, right)),
            BinaryOp::LessThan => Value::Boolean(self.less_than(left, right, true)? == Some(true)),
            BinaryOp::GreaterThan => Value::Boolean(self.less_than(right, left, false)? == Some(true)),
            BinaryOp::LessEqual => Value::Boolean(self.less_than(right, left, false)? == Some(false)),
            BinaryOp::GreaterEqual => Value::Boolean(self.less_than(left, right, true)? == Some(false)),
            BinaryOp::LeftShift => {
                let shift = vm.to_uint32(right)? & 31;
                Value::Number(vm.to_int32(left)?.wrapping_shl(shift) as f64)
            }
            BinaryOp::RightShift => {
                let shift = vm.to_uint32(right)? & 31;
                Value::Number((vm.to_int32(left)? >> shift) as f64)
            }
            BinaryOp::UnsignedRightShift => {
                let shift = vm.to_uint32(right)? & 31;
                Value::Number((vm.to_uint32(left)? >> shift) as f64)
            }
            BinaryOp::BitAnd => Value::Number((vm.to_int32(left)? & vm.to_int32(right)?) as f64),
            BinaryOp::BitOr => Value::Number((vm.to_int32(left)? | vm.to_int32(right)?) as f64),
            BinaryOp::BitXor => Value::Number((vm.to_int32(left)? ^ vm.to_int32(right)?) as f64),
            BinaryOp::In => return self.has_in(left, right),
            BinaryOp::Instanceof => {
                if !vm.is_callable(right) {
                    return Err(vm.raise(
                        ErrorKind::TypeError,
                        "Right-hand side of 'instanceof' is not callable",
                    ));
                }
                Value::Boolean(vm.instance_of(left, right)?)
            }
        };
        Ok(result)
    }

    /// `+`: string concatenation when either primitive is a string.
    fn add(&mut self, left: &Value, right: &Value) -> Result<Value> {
        if let (Value::Number(a), Value::Number(b)) = (left, right) {
            return Ok(Value::Number(a + b));
        }
        let left = self.vm.to_primitive(left, Hint::Default)?;
        let right = self.vm.to_primitive(right, Hint::Default)?;
        if left.is_string() || right.is_string() {
            let mut text = self.vm.to_display_string(&left)?;
            text.push_str(&self.vm.to_display_string(&right)?);
            Ok(Value::String(text))
        } else {
            Ok(Value::Number(self.vm.to_number(&left)? + self.vm.to_number(&right)?))
        }
    }

    /// Abstract relational comparison `a < b`; `None` when a side is NaN.
    fn less_than(&mut self, a: &Value, b: &Value, left_first: bool) -> Result<Option<bool>> {
        let (a, b) = if left_first {
            let a = self.vm.to_primitive(a, Hint::Number)?;
            (a, self.vm.to_primitive(b, Hint::Number)?)
        } else {
            let b = self.vm.to_primitive(b, Hint::Number)?;
            (self.vm.to_primitive(a, Hint::Number)?, b)
        };
        if let (Value::String(x), Value::String(y)) = (&a, &b) {
            return Ok(Some(x.encode_utf16().lt(y.encode_utf16())));
        }
        let x = self.vm.to_number(&a)?;
        let y = self.vm.to_number(&b)?;
        if x.is_nan() || y.is_nan() {
            Ok(None)
        } else {
            Ok(Some(x < y))
        }
    }

    fn has_in(&mut self, key: &Value, object: &Value) -> Result<Value> {
        let Value::Object(obj) = object else {
            let key = self.vm.to_display_string(key)?;
            let shown = self.vm.to_display_string(object)?;
            return Err(self.vm.raise(
                ErrorKind::TypeError,
                format!("Cannot use 'in' operator to search for '{}' in {}", key, shown),
            ));
        };
        let key = self.vm.to_property_key(key)?;
        let slot = self.vm.resolve(obj)?;
        Ok(Value::Boolean(self.vm.find_property(slot, &key)?.is_some()))
    }

    fn evaluate_logical(&mut self, logical: &LogicalExpr) -> Result<Value> {
        let left = self.evaluate(&logical.left)?;
        let short_circuit = match logical.operator {
            LogicalOp::And => !left.to_boolean(),
            LogicalOp::Or => left.to_boolean(),
            LogicalOp::Nullish => !left.is_nullish(),
        };
        if short_circuit {
            Ok(left)
        } else {
            self.evaluate(&logical.right)
        }
    }

    fn evaluate_conditional(&mut self, cond: &ConditionalExpr) -> Result<Value> {
        if self.evaluate(&cond.test)?.to_boolean() {
            self.evaluate(&cond.consequent)
        } else {
            self.evaluate(&cond.alternate)
        }
    }

    fn evaluate_assignment(&mut self, assign: &AssignmentExpr) -> Result<Value> {
        let reference = self.reference(&assign.target)?;
        let value = match assign.operator {
            AssignmentOp::Assign => match &reference {
                Reference::Binding(name) => self.evaluate_named(&assign.value, name)?,
                Reference::Member(..) => self.evaluate(&assign.value)?,
            },
            AssignmentOp::Compound(operator) => {
                let current = self.get_reference(&reference)?;
                let rhs = self.evaluate(&assign.value)?;
                self.binary_op(operator, &current, &rhs)?
            }
            AssignmentOp::Logical(operator) => {
                let current = self.get_reference(&reference)?;
                let keep = match operator {
                    LogicalOp::And => !current.to_boolean(),
                    LogicalOp::Or => current.to_boolean(),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.evaluate(&assign.value)?
            }
        };
        self.put_reference(reference, value.clone())?;
        Ok(value)
    }

    fn evaluate_sequence(&mut self, seq: &SequenceExpr) -> Result<Value> {
        let mut last = Value::Undefined;
        for expr in &seq.expressions {
            last = self.evaluate(expr)?;
        }
        Ok(last)
    }

    fn member_key(&mut self, property: &PropertyName) -> Result<PropertyKey> {
        match property {
            PropertyName::Named(name) => Ok(PropertyKey::from(name.as_str())),
            PropertyName::Computed(expr) => {
                let value = self.evaluate(expr)?;
                self.vm.to_property_key(&value)
            }
        }
    }

    fn evaluate_member(&mut self, member: &MemberExpr) -> Result<Value> {
        let base = self.evaluate(&member.object)?;
        let key = self.member_key(&member.property)?;
        self.vm.get_member(&base, &key)
    }

    fn evaluate_arguments(&mut self, arguments: &[Expression]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.evaluate(argument)?);
        }
        Ok(values)
    }

    fn evaluate_call(&mut self, call: &CallExpr) -> Result<Value> {
        let (callee, this) = match &*call.callee {
            Expression::Member(member) => {
                let base = self.evaluate(&member.object)?;
                let key = self.member_key(&member.property)?;
                let callee = self.vm.get_member(&base, &key)?;
                (callee, base)
            }
            other => (self.evaluate(other)?, Value::Undefined),
        };
        let args = self.evaluate_arguments(&call.arguments)?;
        if !self.vm.is_callable(&callee) {
            let message = format!("{} is not a function", describe(&call.callee));
            return Err(self.vm.raise(ErrorKind::TypeError, message));
        }
        self.vm.call_value(&callee, &this, &args)
    }

    fn evaluate_new(&mut self, new: &NewExpr) -> Result<Value> {
        let callee = self.evaluate(&new.callee)?;
        let args = self.evaluate_arguments(&new.arguments)?;
        if !self.vm.is_callable(&callee) {
            let message = format!("{} is not a constructor", describe(&new.callee));
            return Err(self.vm.raise(ErrorKind::TypeError, message));
        }
        self.vm.construct(&callee, &args)
    }

    fn syntax_error(&mut self, message: &str) -> VmError {
        self.vm.raise(ErrorKind::SyntaxError, message)
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Short source-like rendering of a callee for error messages.
fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Identifier(id) => id.name.clone(),
        Expression::This(_) => "this".to_string(),
        Expression::Member(member) => match &member.property {
            PropertyName::Named(name) => format!("{}.{}", describe(&member.object), name),
            PropertyName::Computed(_) => format!("{}[...]", describe(&member.object)),
        },
        Expression::Call(call) => format!("{}(...)", describe(&call.callee)),
        _ => "expression".to_string(),
    }
}

/// A guest function defined in script source.
pub struct ScriptFunction {
    node: Arc<FunctionNode>,
    /// Scope the function closes over; `None` for top-level functions.
    scope: Option<Scope>,
    /// Arrow functions keep the `this` of their defining context.
    lexical_this: Option<Value>,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.node.name())
            .field("params", &self.node.params.len())
            .field("arrow", &self.node.is_arrow)
            .finish()
    }
}

impl GuestCode for ScriptFunction {
    fn invoke(&self, vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
        let node = &self.node;
        let this = match &self.lexical_this {
            Some(lexical) => lexical.clone(),
            None if this.is_nullish() => vm.get_global()?,
            None => this.clone(),
        };

        let scope = Scope::new(self.scope.clone());
        for (index, param) in node.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            scope.declare(&param.name, value, true);
        }
        if node.uses_arguments && !scope.has_own("arguments") {
            let arguments = vm.create_array_from(args.to_vec())?;
            scope.declare("arguments", arguments, true);
        }
        for name in &node.var_names {
            scope.declare_hoisted(name);
        }

        let mut interp = Interpreter::new(vm, Some(scope), this);
        interp.hoist_functions(&node.body)?;
        match interp.execute_statements(&node.body)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal(_) => Ok(Value::Undefined),
            Completion::Break(_) => Err(interp.syntax_error("Illegal break statement")),
            Completion::Continue(_) => Err(interp.syntax_error("Illegal continue statement")),
        }
    }

    fn arity(&self) -> u32 {
        self.node.params.len() as u32
    }
}
