use super::{DependencyGraph, ResolveState, UnresolvedItem, UnresolvedKind};
use crate::compilation::Compilation;
use crate::declaration::{DeclKind, DeclRef, TypeSource};
use crate::inference::SearchContext;
use crate::metrics::ResolveReport;
use crate::syntax::{DocumentId, NodeId, NodeKind, SyntaxRef};
use crate::types::generics::instantiate_signature;
use crate::types::LuaType;
use tracing::{debug, instrument, trace, warn};

/// Where a member discovered by an assignment is recorded
#[derive(Debug, Clone, PartialEq)]
enum MemberOwner {
    Named(String),
    Table(SyntaxRef),
}

/// A change to the compilation produced by one attempt
#[derive(Debug, Clone, PartialEq)]
enum Effect {
    SetDeclType { decl: DeclRef, ty: LuaType },
    AddMember {
        owner: MemberOwner,
        name: String,
        decl: DeclRef,
    },
    SetReturns { closure: SyntaxRef, returns: Vec<LuaType> },
    SetExport { document: DocumentId, ty: LuaType },
}

/// Result of attempting one item
#[derive(Debug, Default)]
struct Outcome {
    effects: Vec<Effect>,
    /// States this attempt finished
    finished: ResolveState,
    /// Expressions still `unknown` that keep the rest pending
    blockers: Vec<SyntaxRef>,
}

impl Outcome {
    fn finish(&mut self, state: ResolveState) {
        self.finished.insert(state);
    }

    fn block(&mut self, node: SyntaxRef) {
        self.blockers.push(node);
    }
}

/// Drives unresolved items to a fixed point.
///
/// Every attempt runs against a fresh [`SearchContext`] so that types settled
/// by earlier attempts are never hidden behind a stale cache entry. When a
/// whole pass makes no progress the lowest pending item (by source position)
/// is forced, which always terminates: each forced round removes at least one
/// item, and after `max_forced_rounds` everything left is forced at once.
pub struct ResolveAnalyzer<'a> {
    compilation: &'a mut Compilation,
    items: Vec<UnresolvedItem>,
    graph: DependencyGraph,
    report: ResolveReport,
}

impl<'a> ResolveAnalyzer<'a> {
    pub fn new(compilation: &'a mut Compilation, items: Vec<UnresolvedItem>) -> Self {
        let report = ResolveReport {
            items: items.len(),
            ..Default::default()
        };
        Self {
            compilation,
            items,
            graph: DependencyGraph::new(),
            report,
        }
    }

    #[instrument(skip(self), fields(items = self.items.len()))]
    pub fn run(mut self) -> ResolveReport {
        let mut first = true;
        loop {
            while self.pass(first) {
                first = false;
            }
            first = false;
            let pending = self.pending();
            if pending.is_empty() {
                break;
            }
            if self.report.forced_rounds >= self.compilation.options().max_forced_rounds {
                warn!(
                    remaining = pending.len(),
                    rounds = self.report.forced_rounds,
                    "forced round cap reached, forcing every pending item"
                );
                self.report.hit_round_cap = true;
                let mut ordered = pending;
                ordered.sort_by_key(|i| self.items[*i].anchor());
                for item in ordered {
                    self.force(item);
                }
                break;
            }
            let lowest = pending
                .into_iter()
                .min_by_key(|i| self.items[*i].anchor());
            if let Some(item) = lowest {
                self.report.forced_rounds += 1;
                self.force(item);
            }
        }
        debug!(
            passes = self.report.passes,
            resolved = self.report.resolved,
            forced = self.report.forced,
            rounds = self.report.forced_rounds,
            "resolution finished"
        );
        self.report
    }

    fn pending(&self) -> Vec<usize> {
        (0..self.items.len())
            .filter(|i| !self.items[*i].state.is_resolved())
            .collect()
    }

    /// One sweep over the pending items. The first pass attempts everything;
    /// later passes only retry items with a blocker that now infers.
    /// Returns whether any state changed.
    fn pass(&mut self, first: bool) -> bool {
        let pending = self.pending();
        if pending.is_empty() {
            return false;
        }
        self.report.passes += 1;
        let mut progress = false;
        for i in pending {
            if !first && !self.unblocked(i) {
                continue;
            }
            let outcome = attempt(&*self.compilation, &self.items[i], false);
            progress |= self.settle(i, outcome, false);
        }
        trace!(pass = self.report.passes, progress, "resolve pass");
        progress
    }

    fn unblocked(&self, item: usize) -> bool {
        let blockers = self.graph.blockers(item);
        if blockers.is_empty() {
            return true;
        }
        let mut ctx = SearchContext::new(&*self.compilation);
        blockers.iter().any(|node| !ctx.infer(*node).is_unknown())
    }

    fn force(&mut self, item: usize) {
        trace!(item, anchor = ?self.items[item].anchor(), "forcing item");
        let outcome = attempt(&*self.compilation, &self.items[item], true);
        self.settle(item, outcome, true);
    }

    /// Apply an outcome; returns whether the item's state changed
    fn settle(&mut self, item: usize, outcome: Outcome, forced: bool) -> bool {
        for effect in outcome.effects {
            self.apply(effect);
        }
        let state = &mut self.items[item].state;
        let before = *state;
        if forced {
            *state = ResolveState::NONE;
        } else {
            state.remove(outcome.finished);
        }
        if state.is_resolved() {
            self.graph.remove_item(item);
            if forced {
                self.report.forced += 1;
            } else {
                self.report.resolved += 1;
            }
        } else {
            self.graph.add_dependency(item, outcome.blockers);
        }
        *state != before
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SetDeclType { decl, ty } => {
                if let Some(declaration) = self.compilation.decl_mut(decl) {
                    trace!(name = %declaration.name, "settled declaration type");
                    declaration.set_type(ty);
                }
            }
            Effect::AddMember { owner, name, decl } => match owner {
                MemberOwner::Named(type_name) => {
                    self.compilation.index_mut().add_member(&type_name, &name, decl);
                }
                MemberOwner::Table(table) => {
                    self.compilation.index_mut().add_table_member(table, &name, decl);
                }
            },
            Effect::SetReturns { closure, returns } => {
                self.compilation.set_closure_returns(closure, returns);
            }
            Effect::SetExport { document, ty } => {
                self.compilation.index_mut().add_export_type(document, ty);
            }
        }
    }
}

/// Resolve `items` against `compilation`
pub fn analyze(compilation: &mut Compilation, items: Vec<UnresolvedItem>) -> ResolveReport {
    ResolveAnalyzer::new(compilation, items).run()
}

fn attempt(compilation: &Compilation, item: &UnresolvedItem, forced: bool) -> Outcome {
    let mut ctx = SearchContext::new(compilation);
    let mut outcome = Outcome::default();
    let document = item.document;
    match &item.kind {
        UnresolvedKind::Type { decl, expr, index } => {
            resolve_type(&mut ctx, &mut outcome, *decl, SyntaxRef::new(document, *expr), *index, forced);
        }
        UnresolvedKind::Index {
            decl,
            target,
            value,
        } => {
            if item.state.contains(ResolveState::UNRESOLVED_INDEX) {
                resolve_owner(&mut ctx, &mut outcome, *decl, SyntaxRef::new(document, *target), forced);
            }
            if let (Some((expr, index)), true) =
                (value, item.state.contains(ResolveState::UNRESOLVED_TYPE))
            {
                resolve_type(&mut ctx, &mut outcome, *decl, SyntaxRef::new(document, *expr), *index, forced);
            }
        }
        UnresolvedKind::Return { closure } => {
            resolve_returns(&mut ctx, &mut outcome, SyntaxRef::new(document, *closure), forced);
        }
        UnresolvedKind::Parameters {
            closure,
            call,
            arg_index,
        } => {
            resolve_parameters(&mut ctx, &mut outcome, document, *closure, *call, *arg_index, forced);
        }
        UnresolvedKind::ForRange { decls, exprs } => {
            resolve_for_range(&mut ctx, &mut outcome, document, decls, exprs, forced);
        }
    }
    outcome
}

fn resolve_type(
    ctx: &mut SearchContext<'_>,
    outcome: &mut Outcome,
    decl: DeclRef,
    expr: SyntaxRef,
    index: usize,
    forced: bool,
) {
    let compilation = ctx.compilation();
    let Some(declaration) = compilation.decl(decl) else {
        outcome.finish(ResolveState::UNRESOLVED_TYPE);
        return;
    };
    if let Some(LuaType::Named { name, .. }) = declaration.ty() {
        // `---@class` or `---@enum` bound to a table constructor: its keyed
        // fields become members of the type
        if let Some(decls) = compilation.declarations(expr.document) {
            for field in decls.table_fields(expr.node) {
                outcome.effects.push(Effect::AddMember {
                    owner: MemberOwner::Named(name.clone()),
                    name: decls.decl(*field).name.clone(),
                    decl: DeclRef::new(expr.document, *field),
                });
            }
        }
        outcome.finish(ResolveState::UNRESOLVED_TYPE);
        return;
    }
    if declaration.is_typed() {
        outcome.finish(ResolveState::UNRESOLVED_TYPE);
        return;
    }
    let value = ctx.value_of(expr, index);
    if value.is_unknown() && !forced {
        outcome.block(expr);
        return;
    }
    let ty = if declaration.kind.widens_literals() {
        value.widen()
    } else {
        value
    };
    outcome.effects.push(Effect::SetDeclType { decl, ty });
    outcome.finish(ResolveState::UNRESOLVED_TYPE);
}

/// Record an `a.b = ...` or `function a.b()` member on the type of `a`
fn resolve_owner(
    ctx: &mut SearchContext<'_>,
    outcome: &mut Outcome,
    decl: DeclRef,
    target: SyntaxRef,
    forced: bool,
) {
    let compilation = ctx.compilation();
    let (Some(tree), Some(declaration)) = (compilation.syntax(target.document), compilation.decl(decl))
    else {
        outcome.finish(ResolveState::UNRESOLVED_INDEX);
        return;
    };
    let NodeKind::IndexExpr { prefix, .. } = tree.kind(target.node) else {
        outcome.finish(ResolveState::UNRESOLVED_INDEX);
        return;
    };
    let prefix = SyntaxRef::new(target.document, *prefix);
    let owner = ctx.infer(prefix).first_value();
    let owners: Vec<MemberOwner> = owner
        .members()
        .into_iter()
        .filter_map(|ty| match ty {
            LuaType::Named { name, .. } => Some(MemberOwner::Named(name.clone())),
            LuaType::TableLiteral(table) => Some(MemberOwner::Table(*table)),
            _ => None,
        })
        .collect();
    if owner.is_unknown() && !forced {
        outcome.block(prefix);
        return;
    }
    for owner in owners {
        outcome.effects.push(Effect::AddMember {
            owner,
            name: declaration.name.clone(),
            decl,
        });
    }
    outcome.finish(ResolveState::UNRESOLVED_INDEX);
}

fn resolve_returns(ctx: &mut SearchContext<'_>, outcome: &mut Outcome, owner: SyntaxRef, forced: bool) {
    let summary = ctx.infer_body_returns(owner);
    if !summary.blockers.is_empty() && !forced {
        for node in summary.blockers {
            outcome.block(SyntaxRef::new(owner.document, node));
        }
        return;
    }
    let is_chunk = ctx
        .compilation()
        .syntax(owner.document)
        .is_some_and(|tree| matches!(tree.kind(owner.node), NodeKind::Chunk { .. }));
    if is_chunk {
        let ty = summary.returns.first().cloned().unwrap_or(LuaType::Nil);
        outcome.effects.push(Effect::SetExport {
            document: owner.document,
            ty,
        });
    } else {
        outcome.effects.push(Effect::SetReturns {
            closure: owner,
            returns: summary.returns,
        });
    }
    outcome.finish(ResolveState::UNRESOLVED_RETURN);
}

/// Type the undocumented parameters of a function literal passed to a call
/// from the `fun(...)` type the callee declares for that argument
fn resolve_parameters(
    ctx: &mut SearchContext<'_>,
    outcome: &mut Outcome,
    document: DocumentId,
    closure: NodeId,
    call: NodeId,
    arg_index: usize,
    forced: bool,
) {
    let compilation = ctx.compilation();
    let (Some(tree), Some(decls)) = (compilation.syntax(document), compilation.declarations(document)) else {
        outcome.finish(ResolveState::UNRESOLVED_PARAMETERS);
        return;
    };
    let (NodeKind::CallExpr { callee, args }, Some(info)) = (tree.kind(call), decls.closure(closure)) else {
        outcome.finish(ResolveState::UNRESOLVED_PARAMETERS);
        return;
    };
    let callee_ref = SyntaxRef::new(document, *callee);
    let callee_ty = ctx.infer(callee_ref).first_value();
    if callee_ty.is_unknown() && !forced {
        outcome.block(callee_ref);
        return;
    }
    outcome.finish(ResolveState::UNRESOLVED_PARAMETERS);
    let Some(sig) = callee_ty.as_signature().cloned() else {
        return;
    };
    let Some(position) = SearchContext::parameter_position(tree, *callee, &sig, arg_index) else {
        return;
    };
    let sig = if sig.generics.is_empty() {
        (*sig).clone()
    } else {
        let arg_types = ctx.call_arguments(tree, SyntaxRef::new(document, call), *callee, args, &sig);
        let bindings = ctx.bind_arguments(&sig, &arg_types);
        instantiate_signature(&sig, &bindings)
    };
    let Some(expected) = sig.param_type(position).and_then(|ty| ty.as_signature().cloned()) else {
        return;
    };
    for (i, param) in info.params.iter().enumerate() {
        let decl = DeclRef::new(document, *param);
        let documented = decls.decl(*param).source != TypeSource::None;
        if documented {
            continue;
        }
        if let Some(ty) = expected.param_type(i) {
            outcome.effects.push(Effect::SetDeclType {
                decl,
                ty: ty.clone(),
            });
        }
    }
}

/// Type the variables of a generic `for` from the returns of its iterator
fn resolve_for_range(
    ctx: &mut SearchContext<'_>,
    outcome: &mut Outcome,
    document: DocumentId,
    decls: &[DeclRef],
    exprs: &[NodeId],
    forced: bool,
) {
    let Some(first) = exprs.first() else {
        outcome.finish(ResolveState::UNRESOLVED_TYPE);
        return;
    };
    let first = SyntaxRef::new(document, *first);
    let iterator = ctx.infer(first).first_value();
    if iterator.is_unknown() && !forced {
        outcome.block(first);
        return;
    }
    let values: Vec<LuaType> = match (&iterator, iterator.as_signature()) {
        (LuaType::Any, _) => vec![LuaType::Any; decls.len()],
        (_, Some(sig)) => (0..decls.len()).map(|i| sig.return_type().value_at(i)).collect(),
        _ => vec![LuaType::Unknown; decls.len()],
    };
    for (i, (decl, ty)) in decls.iter().zip(values).enumerate() {
        // the control variable is never nil inside the body
        let ty = if i == 0 { ty.without_nil() } else { ty };
        let kind = ctx.compilation().decl(*decl).map(|d| d.kind);
        let ty = match kind {
            Some(DeclKind::Local) => ty.widen(),
            _ => ty,
        };
        outcome.effects.push(Effect::SetDeclType { decl: *decl, ty });
    }
    outcome.finish(ResolveState::UNRESOLVED_TYPE);
}
