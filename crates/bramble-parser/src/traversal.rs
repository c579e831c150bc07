use std::collections::HashMap;
use std::hash::Hash;

/// Callbacks driving an [`AcyclicDepthFirstPostOrderTraversal`].
pub trait GraphTraversalVisitor<N> {
    type Error;

    /// Children of `node`. Called once per node, when it is first reached.
    fn find_children(&mut self, node: &N) -> Result<Vec<N>, Self::Error>;

    /// Called once per node, after all of its children were explored.
    fn on_node_explored(&mut self, node: &N) -> Result<(), Self::Error>;

    fn on_traversal_complete(&mut self, _post_order: &[N]) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalError<N, E> {
    /// The nodes of the cycle in traversal order, starting and ending with the same node.
    Cycle(Vec<N>),
    Visitor(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Iterative depth-first post-order traversal that fails on the first cycle.
///
/// Roots are explored in the given order and children in sorted order, so the resulting order is
/// deterministic.
pub struct AcyclicDepthFirstPostOrderTraversal<V> {
    visitor: V,
}

impl<V> AcyclicDepthFirstPostOrderTraversal<V> {
    pub fn new(visitor: V) -> Self {
        Self { visitor }
    }

    pub fn into_visitor(self) -> V {
        self.visitor
    }

    pub fn traverse<N>(
        &mut self,
        roots: impl IntoIterator<Item = N>,
    ) -> Result<Vec<N>, TraversalError<N, V::Error>>
    where
        N: Clone + Eq + Hash + Ord,
        V: GraphTraversalVisitor<N>,
    {
        let mut states: HashMap<N, VisitState> = HashMap::new();
        let mut post_order = Vec::new();

        for root in roots {
            if states.contains_key(&root) {
                continue;
            }
            let children = self.children(&root)?;
            states.insert(root.clone(), VisitState::Visiting);
            let mut stack = vec![(root, children.into_iter())];

            loop {
                let next = match stack.last_mut() {
                    Some((_, children)) => children.next(),
                    None => break,
                };
                match next {
                    Some(child) => match states.get(&child) {
                        Some(VisitState::Visited) => {}
                        Some(VisitState::Visiting) => {
                            let start = stack
                                .iter()
                                .position(|(node, _)| *node == child)
                                .unwrap_or(0);
                            let mut cycle: Vec<N> =
                                stack[start..].iter().map(|(node, _)| node.clone()).collect();
                            cycle.push(child);
                            return Err(TraversalError::Cycle(cycle));
                        }
                        None => {
                            let grandchildren = self.children(&child)?;
                            states.insert(child.clone(), VisitState::Visiting);
                            stack.push((child, grandchildren.into_iter()));
                        }
                    },
                    None => {
                        let Some((node, _)) = stack.pop() else {
                            break;
                        };
                        self.visitor
                            .on_node_explored(&node)
                            .map_err(TraversalError::Visitor)?;
                        states.insert(node.clone(), VisitState::Visited);
                        post_order.push(node);
                    }
                }
            }
        }

        self.visitor
            .on_traversal_complete(&post_order)
            .map_err(TraversalError::Visitor)?;
        Ok(post_order)
    }

    fn children<N>(&mut self, node: &N) -> Result<Vec<N>, TraversalError<N, V::Error>>
    where
        N: Ord,
        V: GraphTraversalVisitor<N>,
    {
        let mut children = self
            .visitor
            .find_children(node)
            .map_err(TraversalError::Visitor)?;
        children.sort();
        children.dedup();
        Ok(children)
    }
}
